//! Per-projection composition of the homogeneous transform that takes a
//! detector pixel index to volume voxel indices, together with the source
//! position in the same index space.
//!
//! Composition happens at double precision: the ray march tolerates f32, the
//! chained matrix products do not. The result is cast to f32 only at the
//! kernel boundary, by [`ProjectionTransform::for_kernel`].

use nalgebra::{Matrix4, Point3, Vector4};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::projection::ProjectionStack;
use crate::volume::{Sampling, Volume};

#[derive(Clone, Debug)]
pub struct ProjectionTransform {
    /// Detector-pixel-index homogeneous point to volume-voxel-index point
    pub matrix: Matrix4<f64>,
    /// Source position in volume-index space, homogeneous
    pub source: Vector4<f64>,
}

impl ProjectionTransform {
    /// Compose the transform for one projection. Applied right to left to a
    /// detector index point: shift by the projection buffer offset, map pixel
    /// indices to detector coordinates, detector coordinates back to the
    /// fixed system, fixed system to voxel indices (plus half a voxel per
    /// axis in the grid-corner convention), and finally remove the volume
    /// buffer offset. The source skips the detector-side steps.
    ///
    /// Recomputed for every projection index and every invocation; inputs
    /// with different indices never share a transform.
    pub fn compose(
        geometry: &Geometry,
        projection: usize,
        volume: &Volume,
        projections: &ProjectionStack,
        sampling: Sampling,
    ) -> Result<Self> {
        let projection_to_fixed = geometry.projection_to_fixed(projection)?;

        let mut physical_to_index = volume.physical_to_index()?;
        if sampling == Sampling::GridCorner {
            for a in 0..3 {
                physical_to_index[(a, 3)] += 0.5;
            }
        }

        // Translations correcting for non-zero buffer index origins. Only the
        // in-plane detector axes matter on the projection side: the depth
        // coordinate fed to the matrix is always zero.
        let mut projection_offset = Matrix4::identity();
        projection_offset[(0, 3)] = projections.offset[0] as f64;
        projection_offset[(1, 3)] = projections.offset[1] as f64;
        let mut volume_offset = Matrix4::identity();
        for a in 0..3 {
            volume_offset[(a, 3)] = -(volume.offset[a] as f64);
        }

        let matrix = volume_offset
            * physical_to_index
            * projection_to_fixed
            * projections.index_to_physical()
            * projection_offset;

        let source = volume_offset * physical_to_index * geometry.pose(projection)?.source;

        Ok(Self { matrix, source })
    }

    /// Source position as a Euclidean point. A vanishing homogeneous weight
    /// would put the source at infinity, which the ray kernels do not model.
    pub fn source_point(&self) -> Result<Point3<f64>> {
        if self.source.w.abs() < 1e-12 {
            return Err(Error::geometry(
                "source position has vanishing homogeneous weight (source at infinity)",
            ));
        }
        Ok(Point3::new(
            self.source.x / self.source.w,
            self.source.y / self.source.w,
            self.source.z / self.source.w,
        ))
    }

    /// Single-precision matrix and source for the kernels
    pub fn for_kernel(&self) -> Result<(Matrix4<f32>, Point3<f32>)> {
        let s = self.source_point()?;
        Ok((self.matrix.cast::<f32>(), s.cast::<f32>()))
    }
}
