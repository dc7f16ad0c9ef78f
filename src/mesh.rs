//! Triangle primitive, mesh container, and binary STL loading.
//!
//! Grounded in `original_source/stlreader.cpp` (field layout, attribute-byte
//! assertion, vertex-adjacency normal averaging) and `original_source/utils.cpp`
//! (`Triangle` ctor: cached edges, plane parameter, `ray_test`).

use crate::error::MeshError;
use crate::math::{Aabb, Point3, Ray, Vec3, EPSILON};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// A triangle with cached edge vectors, a flat face normal, and a per-vertex
/// normal basis (`base + u*u_normal + v*v_normal` at barycentric (u,v), spec §3).
/// Immutable after mesh load.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub p0: Point3,
    pub p1: Point3,
    pub p2: Point3,
    pub edge01: Vec3,
    pub edge02: Vec3,
    pub face_normal: Vec3,
    /// Per-vertex normals at p0, p1, p2 respectively (barycentric corners).
    pub vertex_normals: [Vec3; 3],
    /// Plane parameter `d` such that `face_normal . p == d` for points on the plane.
    pub plane_param: f64,
    pub aabb: Aabb,
}

impl Triangle {
    /// Builds a triangle from three vertices, computing edges, face normal
    /// (right-hand rule on edge01 x edge02), plane parameter, and AABB.
    /// Per-vertex normals default to the flat face normal at all three
    /// corners; `Mesh::from_triangles` overwrites them with the averaged
    /// adjacency normals once the whole mesh is known.
    pub fn new(p0: Point3, p1: Point3, p2: Point3) -> Self {
        let edge01 = p1 - p0;
        let edge02 = p2 - p0;
        let face_normal = edge01.cross(edge02).normalized();
        // Average the plane offset across all three corners for numerical
        // safety, matching original_source/utils.cpp's Triangle ctor, even
        // though the three dot products are equal in exact arithmetic.
        let plane_param =
            (face_normal.dot(p0) + face_normal.dot(p1) + face_normal.dot(p2)) / 3.0;
        let mut aabb = Aabb::empty();
        aabb.update_point(p0);
        aabb.update_point(p1);
        aabb.update_point(p2);
        Self {
            p0,
            p1,
            p2,
            edge01,
            edge02,
            face_normal,
            vertex_normals: [face_normal, face_normal, face_normal],
            plane_param,
            aabb,
        }
    }

    /// Möller–Trumbore ray/triangle intersection (spec §4.1). Two-sided: the
    /// determinant's sign is ignored beyond the epsilon gate, so the caller
    /// decides whether to shade backfaces.
    pub fn ray_test(&self, ray: &Ray) -> Option<f64> {
        let p = ray.direction.cross(self.edge02);
        let det = self.edge01.dot(p);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let t_vec = ray.origin - self.p0;
        let u = t_vec.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = t_vec.cross(self.edge01);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = self.edge02.dot(q) * inv_det;
        if t <= EPSILON {
            return None;
        }
        Some(t)
    }

    /// Recovers the barycentric (u, v) coordinates of `ray`'s intersection
    /// with this triangle. Only meaningful after `ray_test` (or the k-d
    /// tree's `ray_test`) has already confirmed a hit on this triangle; the
    /// shading path re-derives (u, v) this way rather than threading them
    /// through the tree traversal, which only needs `t` for its contract.
    pub fn barycentric_uv(&self, ray: &Ray) -> (f64, f64) {
        let p = ray.direction.cross(self.edge02);
        let det = self.edge01.dot(p);
        let inv_det = 1.0 / det;
        let t_vec = ray.origin - self.p0;
        let u = t_vec.dot(p) * inv_det;
        let q = t_vec.cross(self.edge01);
        let v = ray.direction.dot(q) * inv_det;
        (u, v)
    }

    /// Interpolated per-vertex normal at barycentric (u, v), u,v as produced
    /// by `ray_test`'s intersection (w = 1 - u - v implicit at p0).
    pub fn interpolated_normal(&self, u: f64, v: f64) -> Vec3 {
        let w = 1.0 - u - v;
        (self.vertex_normals[0] * w + self.vertex_normals[1] * u + self.vertex_normals[2] * v)
            .normalized()
    }

    /// Nudges `point` off this triangle's plane by `altitude` along the face
    /// normal, to avoid self-shadowing after a hit (spec §4.1 "Point lift").
    pub fn lift(&self, point: Point3, altitude: f64) -> Point3 {
        point + self.face_normal * ((self.plane_param - self.face_normal.dot(point)) + altitude)
    }
}

/// An ordered, append-only sequence of triangles. All other entities refer to
/// triangles by stable integer index into this sequence (spec §3).
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
}

/// Wrapper giving raw `f32` vertex coordinates exact bitwise equality and
/// hashing, so they can key a `HashMap` for vertex-adjacency grouping.
/// `original_source/stlreader.cpp` uses a custom `std::less<Vec>` over exact
/// float comparison for the analogous `map<Vec, vector<Triangle*>>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VertexKey(u64, u64, u64);

impl VertexKey {
    fn from_point(p: Point3) -> Self {
        Self(p.x.to_bits(), p.y.to_bits(), p.z.to_bits())
    }
}

impl Mesh {
    /// Builds a `Mesh` from raw triangle vertex positions, then computes
    /// per-vertex normals by grouping triangle corners that share an exact
    /// vertex position and averaging their face normals (spec §4.6 /
    /// `original_source/stlreader.cpp::compute_barycentric_normals`).
    pub fn from_triangles(raw: Vec<(Point3, Point3, Point3)>) -> Self {
        let mut triangles: Vec<Triangle> = raw
            .into_iter()
            .map(|(p0, p1, p2)| Triangle::new(p0, p1, p2))
            .collect();

        let mut adjacency: HashMap<VertexKey, Vec<Vec3>> = HashMap::new();
        for tri in &triangles {
            for p in [tri.p0, tri.p1, tri.p2] {
                adjacency
                    .entry(VertexKey::from_point(p))
                    .or_default()
                    .push(tri.face_normal);
            }
        }

        for tri in &mut triangles {
            for (corner, p) in [tri.p0, tri.p1, tri.p2].into_iter().enumerate() {
                let normals = &adjacency[&VertexKey::from_point(p)];
                let mut sum = Vec3::zero();
                for n in normals {
                    sum += *n;
                }
                tri.vertex_normals[corner] = if sum.near_zero() {
                    tri.face_normal
                } else {
                    sum.normalized()
                };
            }
        }

        Self { triangles }
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Loads a binary STL file (spec §6): 80-byte header (ignored), u32
    /// triangle count, then per triangle: 3xf32 normal (advisory, discarded
    /// and recomputed from vertex winding), 9xf32 vertices, u16 attribute
    /// byte count (must be zero).
    pub fn load_stl(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let mut file = std::fs::File::open(path.as_ref())
            .map_err(|source| MeshError::Io { source })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| MeshError::Io { source })?;
        Self::parse_stl(&bytes)
    }

    pub fn parse_stl(bytes: &[u8]) -> Result<Self, MeshError> {
        const HEADER_LEN: usize = 80;
        if bytes.len() < HEADER_LEN + 4 {
            return Err(MeshError::Truncated);
        }
        let count = u32::from_le_bytes(
            bytes[HEADER_LEN..HEADER_LEN + 4]
                .try_into()
                .expect("slice is exactly 4 bytes"),
        ) as usize;

        let mut cursor = HEADER_LEN + 4;
        let record_len = 12 * 4 + 2; // 3 normal + 9 vertex f32s, + u16 attribute count
        let mut raw = Vec::with_capacity(count);

        for _ in 0..count {
            if bytes.len() < cursor + record_len {
                return Err(MeshError::Truncated);
            }
            // Advisory normal: read past but discarded, per spec §6 — the
            // face normal is always recomputed from vertex winding order.
            cursor += 12;

            let mut read_vertex = |cursor: &mut usize| -> Point3 {
                let x = f32::from_le_bytes(bytes[*cursor..*cursor + 4].try_into().unwrap());
                let y = f32::from_le_bytes(bytes[*cursor + 4..*cursor + 8].try_into().unwrap());
                let z = f32::from_le_bytes(bytes[*cursor + 8..*cursor + 12].try_into().unwrap());
                *cursor += 12;
                Point3::new(x as f64, y as f64, z as f64)
            };
            let p0 = read_vertex(&mut cursor);
            let p1 = read_vertex(&mut cursor);
            let p2 = read_vertex(&mut cursor);

            let attribute_bytes =
                u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
            cursor += 2;
            if attribute_bytes != 0 {
                return Err(MeshError::NonZeroAttributeBytes(attribute_bytes));
            }

            raw.push((p0, p1, p2));
        }

        if count == 0 {
            log::warn!("loaded STL with zero triangles; producing an empty mesh");
        }

        Ok(Self::from_triangles(raw))
    }
}
