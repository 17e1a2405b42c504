// ----------------------------------- CLI -----------------------------------
use clap::Parser;

use conebeam::utils::parse_triplet;

#[derive(Parser, Debug, Clone)]
#[command(name = "project", about = "Cone-beam forward and back projection of a synthetic phantom")]
pub struct Cli {

    /// Voxel box full-widths in mm
    #[arg(short, long, value_parser = parse_triplet::<f64>, default_value = "256,256,256")]
    pub size: (f64, f64, f64),

    /// Number of voxels in each dimension
    #[arg(short, long, value_parser = parse_triplet::<usize>, default_value = "64,64,64")]
    pub n_voxels: (usize, usize, usize),

    /// Detector size in pixels (square)
    #[arg(long, default_value = "128")]
    pub pixels: usize,

    /// Detector pixel pitch in mm
    #[arg(long, default_value = "2.0")]
    pub pitch: f64,

    /// Source-to-isocenter distance in mm
    #[arg(long, default_value = "1000")]
    pub sid: f64,

    /// Source-to-detector distance in mm
    #[arg(long, default_value = "1536")]
    pub sdd: f64,

    /// Number of projections over the arc
    #[arg(short, long, default_value = "36")]
    pub projections: usize,

    /// Total gantry arc in degrees
    #[arg(long, default_value = "360")]
    pub arc: f64,

    /// Ray-march step in mm
    #[arg(long, default_value = "1.0")]
    pub step: f64,

    /// Sample at grid centres instead of grid corners
    #[arg(long)]
    pub center_sampling: bool,

    /// TOML run configuration; overrides step/sampling flags and can enable
    /// motion-compensated back-projection via its [fourd] table
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Back-project the simulated projections and report the result
    #[arg(short, long)]
    pub backproject: bool,

    /// Write the projection stack as raw little-endian f32
    #[arg(short, long)]
    pub out_file: Option<PathBuf>,

    /// Maximum number of rayon threads
    #[arg(short = 'j', long, default_value = "4")]
    pub num_threads: usize,

}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use indicatif::ProgressBar;

use conebeam::config::read_config_file;
use conebeam::fourd::PhaseScheduler;
use conebeam::motion::{DeformationField, DeformationSequence};
use conebeam::phantom::{draw_ellipsoid, Ellipsoid};
use conebeam::projector::{forward_project_one, back_project, ProjectorConfig};
use conebeam::utils::{group_digits, timing::Progress};
use conebeam::volume::Sampling;
use conebeam::{Geometry, ProjectionStack, ProjectionTransform, Volume};

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();

    // Set the maximum number of threads used by rayon for parallel iteration
    match rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global() {
        Err(e) => println!("{}", e),
        Ok(_)  => println!("Using up to {} threads.", args.num_threads),
    }

    let mut progress = Progress::new();

    // Define extent and granularity of voxels, and fill in the phantom
    progress.start("Rasterizing phantom");
    let (sx, sy, sz) = args.size;
    let (nx, ny, nz) = args.n_voxels;
    let spacing = [sx / nx as f64, sy / ny as f64, sz / nz as f64];
    let origin = [
        -0.5 * (nx - 1) as f64 * spacing[0],
        -0.5 * (ny - 1) as f64 * spacing[1],
        -0.5 * (nz - 1) as f64 * spacing[2],
    ];
    let mut volume = Volume::zeros([nx, ny, nz], spacing, origin);
    draw_ellipsoid(&mut volume, &Ellipsoid {
        center: [0.0; 3],
        semi_axes: [0.4 * sx, 0.4 * sy, 0.4 * sz],
        density: 1.0,
    });
    draw_ellipsoid(&mut volume, &Ellipsoid {
        center: [0.15 * sx, 0.0, 0.0],
        semi_axes: [0.1 * sx, 0.1 * sy, 0.1 * sz],
        density: 1.0,
    });
    progress.done();

    let angles = (0..args.projections).map(|i| i as f64 * args.arc / args.projections as f64);
    let geometry = Geometry::circular(angles, args.sid, args.sdd, 0.0, 0.0);
    let mut stack = ProjectionStack::centered(
        [args.pixels, args.pixels],
        args.projections,
        [args.pitch; 2],
    );

    let file_config = match &args.config {
        Some(path) => Some(read_config_file(path.clone())?),
        None => None,
    };
    let config = match &file_config {
        Some(cfg) => cfg.projector()?,
        None => {
            let sampling =
                if args.center_sampling { Sampling::GridCenter } else { Sampling::GridCorner };
            ProjectorConfig { step_size: args.step, sampling }
        }
    };

    println!("Forward projecting {} views ...", args.projections);
    let bar = ProgressBar::new(args.projections as u64);
    progress.start("Forward projection");
    for i in 0..args.projections {
        let transform = ProjectionTransform::compose(&geometry, i, &volume, &stack, config.sampling)?;
        let row = stack.size[0];
        forward_project_one(stack.slice_mut(i)?, row, &volume, &transform, &config)?;
        bar.inc(1);
    }
    bar.finish();
    progress.done();

    let total: f32 = stack.data.iter().sum();
    println!("Projection stack total: {}", group_digits(format!("{total:.0}")));

    if let Some(path) = &args.out_file {
        progress.start("Writing raw projections");
        write_raw(stack.data.iter().copied(), path)?;
        progress.done();
    }

    if args.backproject {
        let motion = match &file_config {
            Some(cfg) => cfg.load_motion()?,
            None => None,
        };
        progress.start("Back projection");
        let initial = Volume::zeros([nx, ny, nz], spacing, origin);
        let image = match motion {
            Some((signal, n_frames)) => {
                signal.validate_length(args.projections)?;
                let deformation = breathing_motion(n_frames, [nx, ny, nz])?;
                let mut scheduler = PhaseScheduler::over_full_stack(
                    &stack, &geometry, &signal, &deformation, config,
                );
                if let Some(cfg) = &file_config {
                    let (first, n) = cfg.sub_range(args.projections);
                    scheduler.first_projection = first;
                    scheduler.n_projections = n;
                }
                scheduler.accumulate(initial)?
            }
            None => back_project(initial, &stack, &geometry, &config)?,
        };
        progress.done();
        println!("Back-projected volume total: {}", group_digits(format!("{:.0}", image.total())));
    }

    Ok(())
}

/// Synthetic cyclic motion standing in for measured vector fields: a
/// left-right displacement ramping sinusoidally over the cycle
fn breathing_motion(
    n_frames: usize,
    size: [usize; 3],
) -> Result<DeformationSequence, conebeam::Error> {
    let n = n_frames.max(1);
    let frames = (0..n)
        .map(|f| {
            let amplitude = (2.0 * (std::f64::consts::TAU * f as f64 / n as f64).sin()) as f32;
            let mut field = DeformationField::zeros(size);
            for d in field.data.iter_mut() {
                *d = [amplitude, 0.0, 0.0];
            }
            field
        })
        .collect();
    DeformationSequence::new(frames)
}

fn write_raw(data: impl Iterator<Item = f32>, path: &PathBuf) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}
