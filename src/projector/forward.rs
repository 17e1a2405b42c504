//! Forward projection: accumulate, for every detector pixel, the line
//! integral of volume intensity along the ray from the source through that
//! pixel, clipped to the volume bounding box.
//!
//! Results are *added* to the pixel's existing value, so multi-pass and
//! subset schemes compose without an explicit zeroing step.

use rayon::prelude::*;

use super::{KernelParams, ProjectorConfig};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::projection::ProjectionStack;
use crate::transform::ProjectionTransform;
use crate::volume::{Intensityf32, Volume};

/// Forward-project the volume into every projection buffered in the stack,
/// composing the transform anew for each projection index.
pub fn forward_project(
    projections: &mut ProjectionStack,
    volume: &Volume,
    geometry: &Geometry,
    config: &ProjectorConfig,
) -> Result<()> {
    config.validate()?;
    for i in projections.projection_range() {
        let i = usize::try_from(i)
            .map_err(|_| Error::config(format!("projection buffer offset yields negative index {i}")))?;
        let transform =
            ProjectionTransform::compose(geometry, i, volume, projections, config.sampling)?;
        let row = projections.size[0];
        forward_project_one(projections.slice_mut(i)?, row, volume, &transform, config)?;
    }
    Ok(())
}

/// Integrate one projection. `slice` is the projection's pixel buffer, u
/// fastest; pixels are independent and processed in parallel.
pub fn forward_project_one(
    slice: &mut [Intensityf32],
    pixels_per_row: usize,
    volume: &Volume,
    transform: &ProjectionTransform,
    config: &ProjectorConfig,
) -> Result<()> {
    let params = KernelParams::new(transform, volume, config)?;
    slice.par_iter_mut().enumerate().for_each(|(n, pixel)| {
        let (u, v) = (n % pixels_per_row, n / pixels_per_row);
        if let Some(steps) = params.march(u, v) {
            let sum: f32 = steps.map(|p| volume.sample(p.coords, params.sampling)).sum();
            // Scale by the physical step so the result approximates a
            // continuous line integral independent of the step choice
            *pixel += sum * params.step();
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use float_eq::assert_float_eq;

    fn small_study() -> (Geometry, Volume, ProjectionStack) {
        let geometry = Geometry::circular([0.0], 500.0, 1000.0, 0.0, 0.0);
        let volume = Volume::ones([8, 8, 8], [1.0; 3], [-3.5; 3]);
        let projections = ProjectionStack::centered([16, 16], 1, [1.0; 2]);
        (geometry, volume, projections)
    }

    #[test]
    fn accumulates_instead_of_overwriting() {
        let (geometry, volume, mut projections) = small_study();
        let config = ProjectorConfig::default();
        forward_project(&mut projections, &volume, &geometry, &config).unwrap();
        let first: Vec<f32> = projections.data.clone();
        forward_project(&mut projections, &volume, &geometry, &config).unwrap();
        for (once, twice) in first.iter().zip(projections.data.iter()) {
            assert_float_eq!(2.0 * once, *twice, rel <= 1e-6);
        }
    }

    #[test]
    fn rays_missing_the_volume_leave_pixels_untouched() {
        let (geometry, volume, _) = small_study();
        // Tiny volume, huge detector: corner pixels miss the clip box
        let mut projections = ProjectionStack::centered([64, 64], 1, [4.0; 2]);
        projections.data.fill(0.25);
        forward_project(&mut projections, &volume, &geometry, &ProjectorConfig::default()).unwrap();
        let corner = projections.slice(0).unwrap()[0];
        assert_float_eq!(corner, 0.25, abs <= 0.0);
    }

    #[test]
    fn invalid_step_size_is_rejected_before_any_work() {
        let (geometry, volume, mut projections) = small_study();
        let config = ProjectorConfig { step_size: 0.0, ..ProjectorConfig::default() };
        let result = forward_project(&mut projections, &volume, &geometry, &config);
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(projections.data.iter().all(|&p| p == 0.0));
    }
}
