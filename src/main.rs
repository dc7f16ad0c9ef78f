//! photon-cli — a Monte-Carlo path tracer over binary STL meshes.
//!
//! Casts rays from a pinhole-plus-thin-lens camera through a k-d tree
//! acceleration structure over a triangle mesh, accumulating samples into a
//! canvas that tonemaps to an 8-bit PNG (spec §1/§2).
//!
//! CLI surface and default scene assembly (camera orbit formula, the three
//! hardcoded lights, tile/thread defaults) are grounded in
//! `original_source/cli_render.cpp`.

mod camera;
mod canvas;
mod display;
mod engine;
mod error;
mod integrator;
mod kdtree;
mod math;
mod mesh;

use camera::Camera;
use clap::Parser;
use display::{LiveDisplay, ProgressReporter, TextProgressBar};
use engine::RenderEngine;
use error::{CrateError, RenderError};
use integrator::{Light, Scene};
use kdtree::{KdTree, MaxChildCount};
use math::{Color, Point3, Vec3};
use mesh::Mesh;
use std::process::ExitCode;
use std::sync::Arc;

/// photon-cli — render a binary STL mesh via Monte Carlo path tracing.
#[derive(Parser, Debug)]
#[command(
    name = "photon-cli",
    version,
    about = "A Monte Carlo path tracer over triangle meshes, written in Rust 🦀",
    after_help = "EXAMPLES:\n  \
                  photon-cli model.stl --output render.png --samples 64\n  \
                  photon-cli model.stl --width 640 --height 480 --display\n  \
                  photon-cli model.stl --samples 200 --progressive 20"
)]
struct Cli {
    /// Input binary STL file.
    input: Vec<std::path::PathBuf>,

    /// Output PNG path.
    #[arg(long, default_value = "output.png")]
    output: std::path::PathBuf,

    /// Number of samples (passes) per pixel.
    #[arg(long, default_value_t = 10)]
    samples: u32,

    /// Output image width in pixels.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Output image height in pixels.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Number of render worker threads (0 = auto-detect).
    #[arg(long, default_value_t = 0)]
    threads: u32,

    /// Tile width in pixels.
    #[arg(long = "tile-width", default_value_t = 64)]
    tile_width: u32,

    /// Tile height in pixels.
    #[arg(long = "tile-height", default_value_t = 64)]
    tile_height: u32,

    /// Camera orbit angle, in radians, around the scene origin.
    #[arg(long, default_value_t = 1.0)]
    angle: f64,

    /// Camera height above the orbit plane.
    #[arg(long = "camera-altitude", default_value_t = 0.2)]
    camera_altitude: f64,

    /// Depth-of-field Gaussian aperture standard deviation. 0.0 disables DoF.
    #[arg(long = "dof-aperture", default_value_t = 0.0)]
    dof_aperture: f64,

    /// Distance to the plane of focus (only meaningful if `--dof-aperture` is nonzero).
    #[arg(long = "dof-distance", default_value_t = 1.0)]
    dof_distance: f64,

    /// Show a live terminal preview of the render in progress instead of a plain progress bar.
    #[arg(long)]
    display: bool,

    /// Reissue all tiles in batches of this many passes at a time, instead of all `--samples` at once.
    #[arg(long)]
    progressive: Option<u32>,
}

/// Camera origin on a radius-5 circle in the xy-plane at `angle`, looking
/// back at the scene origin, lifted by `altitude` on the z axis
/// (`original_source/cli_render.cpp`'s `main_camera` setup, verbatim). Pulled
/// out as a pure function so the orbit math can be pinned by a unit test
/// independent of mesh loading or rendering.
fn camera_origin_and_direction(angle: f64, altitude: f64) -> (Point3, Vec3) {
    let orbit = Vec3::new(angle.cos(), angle.sin(), 0.0) * -5.0;
    let origin = orbit + Vec3::new(0.0, 0.0, altitude);
    let direction = -orbit;
    (origin, direction)
}

fn run(cli: Cli) -> Result<(), CrateError> {
    if cli.input.is_empty() {
        return Err(RenderError::NoInput.into());
    }
    if cli.input.len() > 1 {
        return Err(RenderError::TooManyInputs.into());
    }
    let input_path = &cli.input[0];

    log::info!("loading mesh from {}", input_path.display());
    let mesh = Arc::new(Mesh::load_stl(input_path)?);
    log::info!("loaded {} triangles", mesh.len());

    let tree = Arc::new(KdTree::build(mesh.clone(), &MaxChildCount)?);
    let stats = tree.stats();
    log::info!(
        "built k-d tree: deepest_depth={} biggest_leaf={}",
        stats.deepest_depth,
        stats.biggest_leaf
    );

    let (origin, direction) = camera_origin_and_direction(cli.angle, cli.camera_altitude);
    let camera = Camera::new(origin, direction, Vec3::unit_z(), 0.75)
        .with_dof(cli.dof_distance, cli.dof_aperture);

    // Three hardcoded lights (original_source/cli_render.cpp, verbatim colors/positions).
    let lights = vec![
        Light {
            position: Point3::new(0.0, 0.0, 3.0),
            color: Color::new(0.8, 0.5, 0.25) * 9.0,
        },
        Light {
            position: Point3::new(-2.0, 2.0, 4.0),
            color: Color::new(0.25, 0.8, 0.25) * 9.0,
        },
        Light {
            position: Point3::new(-2.0, -2.0, 4.0),
            color: Color::new(0.25, 0.25, 0.8) * 9.0,
        },
    ];

    let scene = Arc::new(Scene {
        mesh,
        tree,
        lights,
        camera,
    });

    let thread_count = if cli.threads == 0 {
        engine::default_thread_count()
    } else {
        cli.threads as usize
    };
    log::info!("using {thread_count} render threads");

    let mut engine = RenderEngine::new(cli.width as usize, cli.height as usize, scene, thread_count);
    engine.tile_width = cli.tile_width as usize;
    engine.tile_height = cli.tile_height as usize;

    let t0 = std::time::Instant::now();
    let total_passes = match cli.progressive {
        Some(chunk) if chunk > 0 => {
            let full_chunks = cli.samples / chunk;
            for _ in 0..full_chunks {
                engine.perform_full_passes(chunk);
            }
            let remainder = cli.samples % chunk;
            if remainder > 0 {
                engine.perform_full_passes(remainder);
            }
            engine.total_passes_issued()
        }
        _ => {
            engine.perform_full_passes(cli.samples);
            engine.total_passes_issued()
        }
    };

    if cli.display {
        let mut reporter = LiveDisplay::new(total_passes);
        reporter.run_to_completion(&engine);
    } else {
        let mut reporter = TextProgressBar::new(total_passes);
        reporter.run_to_completion(&engine);
    }

    engine.sync();
    engine.rebuild_master_canvas();
    let elapsed = t0.elapsed();

    let total_rays = cli.width as u64 * cli.height as u64 * cli.samples as u64;
    eprintln!(
        "  Time: {:.2}s | {:.2}M rays | {:.2} Mrays/s",
        elapsed.as_secs_f64(),
        total_rays as f64 / 1e6,
        total_rays as f64 / elapsed.as_secs_f64() / 1e6,
    );

    engine.master_canvas().save(&cli.output)?;
    eprintln!("  Wrote to: {}", cli.output.display());

    engine.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s8_camera_orbit_matches_closed_form_at_zero_angle() {
        let (origin, direction) = camera_origin_and_direction(0.0, 0.2);
        assert!((origin.x - -5.0).abs() < 1e-9);
        assert!((origin.y - 0.0).abs() < 1e-9);
        assert!((origin.z - 0.2).abs() < 1e-9);
        // direction points from origin back toward the scene origin, i.e. -orbit.
        assert!((direction.x - 5.0).abs() < 1e-9);
        assert!((direction.y - 0.0).abs() < 1e-9);
        assert!((direction.z - 0.0).abs() < 1e-9);
    }

    #[test]
    fn s8_camera_orbit_radius_is_five_regardless_of_angle() {
        for angle in [0.0, 0.7, 1.0, 3.0, 5.5] {
            let (origin, _) = camera_origin_and_direction(angle, 0.0);
            let radius = (origin.x * origin.x + origin.y * origin.y).sqrt();
            assert!((radius - 5.0).abs() < 1e-9, "angle {angle}: radius {radius}");
        }
    }
}
