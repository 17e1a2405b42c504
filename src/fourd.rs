//! 4D phase scheduler: motion-compensated accumulation of a projection stack
//! into a volume.
//!
//! Projections are processed in phase-sorted order so that phase-adjacent
//! ones reuse the interpolated deformation field. The order is purely an
//! efficiency measure: every projection's warped splat is independent, so the
//! final volume does not depend on it. Across projections the chain is
//! strictly sequential; the working volume is owned by the scheduler and
//! handed from one generation to the next by move.

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::motion::DeformationSequence;
use crate::projection::ProjectionStack;
use crate::projector::{back_project_one, ProjectorConfig};
use crate::signal::PhaseSignal;
use crate::transform::ProjectionTransform;
use crate::volume::Volume;

pub struct PhaseScheduler<'a> {
    pub projections: &'a ProjectionStack,
    pub geometry: &'a Geometry,
    pub signal: &'a PhaseSignal,
    pub deformation: &'a DeformationSequence,
    pub config: ProjectorConfig,
    /// First projection index of the requested sub-range
    pub first_projection: usize,
    /// Number of projections in the requested sub-range
    pub n_projections: usize,
}

impl<'a> PhaseScheduler<'a> {
    /// Sub-range covering the whole buffered stack
    pub fn over_full_stack(
        projections: &'a ProjectionStack,
        geometry: &'a Geometry,
        signal: &'a PhaseSignal,
        deformation: &'a DeformationSequence,
        config: ProjectorConfig,
    ) -> Self {
        Self {
            projections,
            geometry,
            signal,
            deformation,
            config,
            first_projection: projections.offset[2].max(0) as usize,
            n_projections: projections.n_projections,
        }
    }

    fn in_scope(&self, projection: usize) -> bool {
        projection >= self.first_projection
            && projection < self.first_projection + self.n_projections
    }

    /// Run the accumulation chain. Consumes the initial volume state and
    /// returns the final generation; every intermediate generation is
    /// consumed by the step that follows it. All configuration is validated
    /// before the first kernel is launched.
    pub fn accumulate(&self, initial: Volume) -> Result<Volume> {
        self.config.validate()?;
        self.signal.validate_length(self.projections.n_projections)?;
        self.deformation.validate_grid(&initial)?;

        let order = self.signal.sorting_permutation();
        let first_buffered = self.projections.offset[2] as i64;

        let mut volume = initial;
        let mut cached_phase = f64::NAN;
        let mut field = None;
        for local in order {
            // The signal holds one value per buffered slice; geometry and
            // stack are addressed by global projection index
            let global = usize::try_from(first_buffered + local as i64).map_err(|_| {
                Error::config(format!(
                    "projection buffer offset yields negative index {}",
                    first_buffered + local as i64
                ))
            })?;
            if !self.in_scope(global) {
                continue;
            }
            let phase = self.signal.value(local)?;
            // NaN compares unequal, so the first in-scope projection always
            // interpolates; later ones reuse the field while the phase holds
            if phase != cached_phase {
                field = Some(self.deformation.interpolate(phase)?);
                cached_phase = phase;
            }
            let transform = ProjectionTransform::compose(
                self.geometry,
                global,
                &volume,
                self.projections,
                self.config.sampling,
            )?;
            volume = back_project_one(
                volume,
                self.projections,
                global,
                &transform,
                field.as_ref(),
                &self.config,
            )?;
        }
        Ok(volume)
    }
}
