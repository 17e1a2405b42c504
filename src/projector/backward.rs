//! Back-projection: the adjoint of forward projection. Each detector pixel's
//! value is distributed back into the volume along the same clipped ray, one
//! trilinear splat per march step.
//!
//! The volume generation is consumed and returned: callers hand the working
//! volume through a chain of invocations by move, and an error returns before
//! the input generation has been touched.

use nalgebra::Vector3;
use rayon::prelude::*;

use super::{elementwise_add, job_size, KernelParams, ProjectorConfig};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::motion::DeformationField;
use crate::projection::ProjectionStack;
use crate::transform::ProjectionTransform;
use crate::volume::{splat, Volume};

/// Back-project every projection buffered in the stack into the volume
pub fn back_project(
    volume: Volume,
    projections: &ProjectionStack,
    geometry: &Geometry,
    config: &ProjectorConfig,
) -> Result<Volume> {
    config.validate()?;
    let mut volume = volume;
    for i in projections.projection_range() {
        let i = usize::try_from(i)
            .map_err(|_| Error::config(format!("projection buffer offset yields negative index {i}")))?;
        let transform =
            ProjectionTransform::compose(geometry, i, &volume, projections, config.sampling)?;
        volume = back_project_one(volume, projections, i, &transform, None, config)?;
    }
    Ok(volume)
}

/// Splat one projection into the volume. With `warp` set, every splat
/// position is first displaced by the deformation field sampled there, which
/// keeps each projection's contribution independent of processing order.
///
/// One rayon task per source ray, each folding into its own accumulator
/// volume; accumulators are then summed and added into the input generation
/// in a single pass.
pub fn back_project_one(
    mut volume: Volume,
    projections: &ProjectionStack,
    projection: usize,
    transform: &ProjectionTransform,
    warp: Option<&DeformationField>,
    config: &ProjectorConfig,
) -> Result<Volume> {
    if let Some(field) = warp {
        field.validate_grid(&volume)?;
    }
    let params = KernelParams::new(transform, &volume, config)?;
    let slice = projections.slice(projection)?;
    let row = projections.size[0];
    let n_voxels = volume.n_voxels();
    let size = volume.size;
    let inv_spacing = Vector3::new(
        1.0 / volume.spacing[0] as f32,
        1.0 / volume.spacing[1] as f32,
        1.0 / volume.spacing[2] as f32,
    );

    let job = job_size(slice.len());
    let delta = slice
        .par_iter()
        .enumerate()
        .with_min_len(job)
        .with_max_len(job)
        .fold(
            || vec![0.0f32; n_voxels],
            |mut acc, (n, &value)| {
                if value != 0.0 {
                    let (u, v) = (n % row, n / row);
                    if let Some(steps) = params.march(u, v) {
                        let weight = value * params.step();
                        for p in steps {
                            let mut pos = p.coords;
                            if let Some(field) = warp {
                                // Displacement is physical; convert to voxels
                                let d = field.sample(pos, params.sampling);
                                pos += d.component_mul(&inv_spacing);
                            }
                            splat(&mut acc, size, pos, params.sampling, weight);
                        }
                    }
                }
                acc
            },
        )
        .reduce(|| vec![0.0f32; n_voxels], elementwise_add);

    volume.accumulate(&delta);
    Ok(volume)
}
