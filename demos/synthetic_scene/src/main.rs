use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;

use voxfuse::image::{DepthImage, ImageSize};
use voxfuse::k3d::accumulator::FrameStats;
use voxfuse::k3d::camera::Camera;
use voxfuse::k3d::carving;
use voxfuse::k3d::frame::Frame;
use voxfuse::k3d::fusion::{self, FusionConfig};
use voxfuse::k3d::voxel_grid::{GridGeometry, VoxelGrid};

const SPHERE_CENTER: [f64; 3] = [0.0, 0.0, 1.5];
const SPHERE_RADIUS: f64 = 0.3;
const WALL_Z: f64 = 2.2;

#[derive(FromArgs)]
/// Carve and fuse depth maps rendered from a sphere in front of a wall
struct Args {
    /// number of camera views
    #[argh(option, short = 'n', default = "12")]
    num_frames: usize,

    /// seed of the depth noise
    #[argh(option, default = "0")]
    seed: u64,

    /// half width of the uniform depth noise, in metres
    #[argh(option, default = "0.002")]
    noise: f32,

    /// fraction of pixels dropped from every depth map
    #[argh(option, default = "0.05")]
    dropout: f64,

    /// number of voxels along each axis
    #[argh(option, default = "48")]
    resolution: usize,

    /// path to a JSON fusion config
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// fuse frames in parallel
    #[argh(switch, short = 'p')]
    parallel: bool,

    /// path to write a JSON report to
    #[argh(option, short = 'o')]
    report: Option<PathBuf>,
}

#[derive(Serialize)]
struct FrameReport {
    frame_index: usize,
    fraction_inside: f64,
    fraction_updated: f64,
    num_visible: usize,
}

impl From<&FrameStats> for FrameReport {
    fn from(stats: &FrameStats) -> Self {
        Self {
            frame_index: stats.frame_index,
            fraction_inside: stats.fraction_inside(),
            fraction_updated: stats.fraction_updated(),
            num_visible: stats.num_visible,
        }
    }
}

#[derive(Serialize)]
struct Report {
    config: FusionConfig,
    num_frames: usize,
    num_voxels: usize,
    num_carved: usize,
    num_valid: usize,
    num_visible: usize,
    // mean |tsdf| over valid voxels lying inside the sphere shell of one voxel
    surface_residual: f64,
    frames: Vec<FrameReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str::<FusionConfig>(&std::fs::read_to_string(path)?)?,
        None => FusionConfig::default(),
    };
    log::info!("fusion config: {:?}", config);

    if args.resolution == 0 {
        return Err("resolution must be positive".into());
    }

    let frames = render_frames(&args)?;

    let voxel_size = 2.0 * (SPHERE_RADIUS + 0.05) / args.resolution as f64;
    let half = 0.5 * voxel_size * (args.resolution - 1) as f64;
    let grid = GridGeometry::new(
        [args.resolution; 3],
        voxel_size,
        [
            SPHERE_CENTER[0] - half,
            SPHERE_CENTER[1] - half,
            SPHERE_CENTER[2] - half,
        ],
    )?;

    let mut counts = VoxelGrid::<u32>::new(grid.clone());
    carving::carve(&mut counts, &frames)?;

    let output = if args.parallel {
        fusion::fuse_par(&grid, &frames, &config)?
    } else {
        fusion::fuse(&grid, &frames, &config)?
    };

    let mut residual_sum = 0.0;
    let mut residual_count = 0usize;
    for (flat, &value) in output.tsdf.as_slice().iter().enumerate() {
        let p = grid.index_to_world(grid.unflatten(flat));
        let dist = distance(&p, &SPHERE_CENTER) - SPHERE_RADIUS;
        if !value.is_nan() && dist.abs() < 0.5 * voxel_size {
            residual_sum += value.abs() as f64;
            residual_count += 1;
        }
    }

    let report = Report {
        config,
        num_frames: frames.len(),
        num_voxels: grid.num_voxels(),
        num_carved: counts.count(|&c| c > 0),
        num_valid: output.tsdf.count(|v| !v.is_nan()),
        num_visible: output.visible.count(|&v| v),
        surface_residual: if residual_count > 0 {
            residual_sum / residual_count as f64
        } else {
            f64::NAN
        },
        frames: output.stats.iter().map(FrameReport::from).collect(),
    };

    println!(
        "{} frames, {} voxels: {} carved, {} valid, {} visible, surface residual {:.4}",
        report.num_frames,
        report.num_voxels,
        report.num_carved,
        report.num_valid,
        report.num_visible,
        report.surface_residual,
    );

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        log::info!("report written to {}", path.display());
    }

    Ok(())
}

/// Render noisy depth maps from cameras on an arc around the sphere, all looking at it.
fn render_frames(args: &Args) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    let size = ImageSize {
        width: 160,
        height: 120,
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let dropout = args.dropout.clamp(0.0, 1.0);

    let mut frames = Vec::with_capacity(args.num_frames);
    for i in 0..args.num_frames {
        let angle = if args.num_frames > 1 {
            -0.6 + 1.2 * i as f64 / (args.num_frames - 1) as f64
        } else {
            0.0
        };
        let position = [
            SPHERE_CENTER[0] - 1.5 * angle.sin(),
            0.1 * angle.cos(),
            SPHERE_CENTER[2] - 1.5 * angle.cos(),
        ];
        let camera = Camera::new(
            [[150.0, 0.0, 79.5], [0.0, 150.0, 59.5], [0.0, 0.0, 1.0]],
            look_at(position, SPHERE_CENTER),
        )?
        .with_image_size(size);

        // points at unit depth give the ray direction of every pixel
        let pixels = (0..size.height)
            .flat_map(|v| (0..size.width).map(move |u| [u as f64, v as f64, 1.0]))
            .collect::<Vec<_>>();
        let unit_depth = camera.inv_project_points(&pixels);

        let mut values = Vec::with_capacity(pixels.len());
        for p in unit_depth.iter() {
            let dir = [p[0] - position[0], p[1] - position[1], p[2] - position[2]];
            let depth = match ray_depth(&position, &dir) {
                Some(_) if rng.random_bool(dropout) => f32::NAN,
                Some(t) if args.noise > 0.0 => t as f32 + rng.random_range(-args.noise..args.noise),
                Some(t) => t as f32,
                None => f32::NAN,
            };
            values.push(depth);
        }

        let depth = DepthImage::new(size, values)?;
        log::debug!("view {}: {} pixels without depth", i, depth.count_nan());
        frames.push(Frame::new(depth, camera)?.with_id(format!("view_{:03}", i)));
    }

    Ok(frames)
}

/// Camera-to-world transform of a camera at `eye` looking at `target`, image y down.
fn look_at(eye: [f64; 3], target: [f64; 3]) -> [[f64; 4]; 4] {
    let forward = normalize(sub(&target, &eye));
    let right = normalize(cross(&forward, &[0.0, -1.0, 0.0]));
    let down = cross(&forward, &right);
    let mut h = [[0.0; 4]; 4];
    for r in 0..3 {
        h[r] = [right[r], down[r], forward[r], eye[r]];
    }
    h[3][3] = 1.0;
    h
}

/// Distance along the optical axis to the first hit of the ray `origin + t * dir`,
/// where `dir` has unit depth.
fn ray_depth(origin: &[f64; 3], dir: &[f64; 3]) -> Option<f64> {
    let oc = sub(origin, &SPHERE_CENTER);
    let a = dot(dir, dir);
    let b = 2.0 * dot(&oc, dir);
    let c = dot(&oc, &oc) - SPHERE_RADIUS * SPHERE_RADIUS;
    let disc = b * b - 4.0 * a * c;
    let sphere = (disc >= 0.0)
        .then(|| (-b - disc.sqrt()) / (2.0 * a))
        .filter(|&t| t > 0.0);

    let wall = (dir[2] > 0.0)
        .then(|| (WALL_Z - origin[2]) / dir[2])
        .filter(|&t| t > 0.0);

    match (sphere, wall) {
        (Some(s), Some(w)) => Some(s.min(w)),
        (s, w) => s.or(w),
    }
}

fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = dot(&v, &v).sqrt();
    [v[0] / n, v[1] / n, v[2] / n]
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d = sub(a, b);
    dot(&d, &d).sqrt()
}
