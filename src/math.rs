use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Neg, Sub};

/// A 3-component vector used for positions, directions, and colors in the ray tracer.
///
/// This type implements all standard arithmetic operations with operator overloading,
/// and provides geometric utilities (dot product, cross product) needed for the
/// light transport simulation in `integrator.rs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub type Point3 = Vec3;
pub type Color = Vec3;

/// Möller–Trumbore / slab-test epsilon. Fixed at 1e-4 rather than 1e-8: this is
/// single-precision triangle math (STL vertices are f32 on disk) widened to f64,
/// and the looser bound avoids self-intersection acne after the point "lift"
/// without introducing visible peter-panning. See DESIGN.md Open Question (ii).
pub const EPSILON: f64 = 1e-4;

impl Vec3 {
    #[inline(always)]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn ones() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    #[inline(always)]
    pub const fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Squared Euclidean length — avoids the sqrt for performance-critical paths
    /// such as k-d tree traversal and intersection culling.
    #[inline(always)]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline(always)]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns the unit vector. Panics in debug builds on near-zero-length input;
    /// callers are responsible for avoiding degenerate directions (spec §3).
    #[inline(always)]
    pub fn normalized(self) -> Self {
        let len = self.length();
        debug_assert!(len > 1e-12, "attempted to normalize a zero-length vector");
        self / len
    }

    #[inline(always)]
    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Cross product — used for constructing orthonormal camera bases and for
    /// face-normal computation during mesh loading.
    #[inline(always)]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Specular reflection of `self` about the surface normal `n`: I - 2·dot(I, N)·N.
    #[inline(always)]
    pub fn reflect(self, normal: Self) -> Self {
        self - normal * 2.0 * self.dot(normal)
    }

    /// Component-wise (Hadamard) product — used for light-color modulation.
    #[inline(always)]
    pub fn hadamard(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    #[inline(always)]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline(always)]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    /// Clamps each component to [0, 1] — used before quantizing HDR radiance
    /// values to 8-bit for PNG/terminal display.
    #[inline(always)]
    pub fn saturate(self) -> Self {
        Self::new(
            self.x.clamp(0.0, 1.0),
            self.y.clamp(0.0, 1.0),
            self.z.clamp(0.0, 1.0),
        )
    }

    /// Checks if the vector is near-zero in all components.
    #[inline(always)]
    pub fn near_zero(self) -> bool {
        const EPS: f64 = 1e-8;
        self.x.abs() < EPS && self.y.abs() < EPS && self.z.abs() < EPS
    }

    /// Converts a [0,1] color to an 8-bit RGB triple.
    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let c = self.saturate();
        (
            (c.x * 255.999) as u8,
            (c.y * 255.999) as u8,
            (c.z * 255.999) as u8,
        )
    }

    /// Draws three independent standard-normal values via Box–Muller and
    /// normalizes the result. Matches `sample_unit_sphere` in the reference
    /// implementation, which uses `std::normal_distribution<>(0, 1)` three times.
    ///
    /// Degenerate only if all three draws round to exactly zero, which has
    /// probability zero for a continuous distribution; callers need not handle it.
    pub fn random_unit_sphere_gaussian(rng: &mut dyn rand::RngCore) -> Self {
        Self::new(gaussian(rng), gaussian(rng), gaussian(rng)).normalized()
    }
}

/// Standard-normal sample via the Box–Muller transform, built on `rand`'s
/// uniform `f64` generation (the teacher's `rand` dependency; no `rand_distr`
/// is introduced since this single transform covers every Gaussian need in
/// the crate — camera DoF jitter and bounce-direction sampling alike).
pub fn gaussian(rng: &mut dyn rand::RngCore) -> f64 {
    use rand::Rng;
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, t: f64) -> Self {
        Self::new(self.x * t, self.y * t, self.z * t)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    #[inline(always)]
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl MulAssign<f64> for Vec3 {
    #[inline(always)]
    fn mul_assign(&mut self, t: f64) {
        self.x *= t;
        self.y *= t;
        self.z *= t;
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn div(self, t: f64) -> Self {
        let inv = 1.0 / t;
        Self::new(self.x * inv, self.y * inv, self.z * inv)
    }
}

impl DivAssign<f64> for Vec3 {
    #[inline(always)]
    fn div_assign(&mut self, t: f64) {
        let inv = 1.0 / t;
        self.x *= inv;
        self.y *= inv;
        self.z *= inv;
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index out of bounds: {i}"),
        }
    }
}

// ─── Ray ────────────────────────────────────────────────────────────────────

/// A parametric ray R(t) = origin + t · direction. `direction` is normalized
/// at construction time (spec §3 invariant); a degenerate input direction
/// propagates NaN rather than panicking, matching spec §7's error policy for
/// a degenerate camera basis.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vec3,
}

impl Ray {
    #[inline]
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }

    #[inline(always)]
    pub fn at(self, t: f64) -> Point3 {
        self.origin + self.direction * t
    }
}

/// A `Ray` augmented with the componentwise reciprocal of its direction, so
/// that repeated AABB slab tests against the same ray (as happens throughout
/// k-d tree traversal) avoid recomputing the division each time.
#[derive(Debug, Clone, Copy)]
pub struct CastingRay {
    pub ray: Ray,
    pub recip_direction: Vec3,
}

impl CastingRay {
    pub fn new(ray: Ray) -> Self {
        let recip_direction = Vec3::new(
            1.0 / ray.direction.x,
            1.0 / ray.direction.y,
            1.0 / ray.direction.z,
        );
        Self { ray, recip_direction }
    }
}

// ─── Axis-Aligned Bounding Box ──────────────────────────────────────────────

/// An axis-aligned bounding box, used both as the k-d tree node bound and as
/// the per-triangle bound. Supports a sentinel "empty" state (minima = +inf,
/// maxima = -inf) so that folding points/boxes into an accumulator can start
/// from `Aabb::empty()` uniformly, matching `original_source/utils.cpp`'s
/// default-constructed `AABB`.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    pub const fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Grows the box to include a point. Calling this on `Aabb::empty()`
    /// initializes the box to exactly that point, per spec §3.
    pub fn update_point(&mut self, p: Point3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grows the box to include another box.
    pub fn update_box(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Union of two boxes, as a fresh value.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Aabb {
        let mut out = *a;
        out.update_box(b);
        out
    }

    /// Slab-method ray-AABB intersection test (spec §4.1). Takes a
    /// pre-built `CastingRay` so callers that test the same ray against many
    /// boxes (tree traversal) pay the reciprocal division once.
    pub fn does_ray_intersect(&self, casting_ray: &CastingRay) -> bool {
        let mut t_start = f64::NEG_INFINITY;
        let mut t_end = f64::INFINITY;
        for axis in 0..3 {
            let inv_d = casting_ray.recip_direction[axis];
            let mut t0 = (self.min[axis] - casting_ray.ray.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - casting_ray.ray.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_start = t_start.max(t0);
            t_end = t_end.min(t1);
        }
        t_end >= 0.0 && t_start <= t_end
    }

    /// Index of the longest axis (0=x, 1=y, 2=z).
    pub fn longest_axis(&self) -> usize {
        let dx = self.max.x - self.min.x;
        let dy = self.max.y - self.min.y;
        let dz = self.max.z - self.min.z;
        if dx >= dy && dx >= dz {
            0
        } else if dy >= dz {
            1
        } else {
            2
        }
    }

    /// Surface area of the box, used by the `SurfaceAreaHeuristic`
    /// `SplitCostPolicy` (spec §9) rather than the default max-child-count cost.
    pub fn surface_area(&self) -> f64 {
        let dx = (self.max.x - self.min.x).max(0.0);
        let dy = (self.max.y - self.min.y).max(0.0);
        let dz = (self.max.z - self.min.z).max(0.0);
        2.0 * (dx * dy + dy * dz + dz * dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_direction_is_normalized() {
        let r = Ray::new(Point3::zero(), Vec3::new(3.0, 0.0, 4.0));
        assert!((r.direction.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_aabb_absorbs_first_point() {
        let mut b = Aabb::empty();
        b.update_point(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(b.min, b.max);
        assert_eq!(b.min, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn slab_test_hits_box_centered_on_ray() {
        let b = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(b.does_ray_intersect(&CastingRay::new(ray)));
    }

    #[test]
    fn slab_test_misses_box_behind_origin() {
        let b = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!b.does_ray_intersect(&CastingRay::new(ray)));
    }

    #[test]
    fn cross_product_is_orthogonal_to_inputs() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        let c = a.cross(b);
        assert!(c.dot(a).abs() < 1e-12);
        assert!(c.dot(b).abs() < 1e-12);
    }

    #[test]
    fn gaussian_sampler_produces_finite_varied_values() {
        let mut rng = rand::thread_rng();
        let samples: Vec<f64> = (0..100).map(|_| gaussian(&mut rng)).collect();
        assert!(samples.iter().all(|v| v.is_finite()));
        let mean: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 1.5, "mean {mean} implausible for 100 standard-normal draws");
    }
}
