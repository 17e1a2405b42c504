//! The stack of 2D detector images, one slice per projection index.
//!
//! All slices share pixel dimensions and pixel metadata; the buffer may start
//! at a non-zero index on any axis, including the projection axis, so a stack
//! can hold a sub-range of a study's projections.

use nalgebra::Matrix4;

use crate::error::{Error, Result};
use crate::volume::Intensityf32;

#[derive(Clone, Debug)]
pub struct ProjectionStack {
    /// Detector pixel counts `[u, v]`, u fastest in the flat buffer
    pub size: [usize; 2],
    pub n_projections: usize,
    /// Detector pixel pitch in mm
    pub spacing: [f64; 2],
    /// Physical position of the pixel with zero buffer-local index
    pub origin: [f64; 2],
    /// Index-space offset of the buffer: `[u, v, projection]`
    pub offset: [i32; 3],
    pub data: Vec<Intensityf32>,
}

impl ProjectionStack {
    pub fn new(
        size: [usize; 2],
        n_projections: usize,
        spacing: [f64; 2],
        origin: [f64; 2],
        offset: [i32; 3],
        data: Vec<Intensityf32>,
    ) -> Result<Self> {
        if spacing.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::config(format!("detector pixel spacing must be positive, got {spacing:?}")));
        }
        let n = size[0] * size[1] * n_projections;
        if data.len() != n {
            return Err(Error::config(format!(
                "projection buffer holds {} pixels but {n_projections} projections of size {size:?} need {n}",
                data.len()
            )));
        }
        Ok(Self { size, n_projections, spacing, origin, offset, data })
    }

    /// Panics on non-positive spacing; use [`Self::new`] for a fallible check
    pub fn zeros(size: [usize; 2], n_projections: usize, spacing: [f64; 2], origin: [f64; 2]) -> Self {
        assert!(spacing.iter().all(|&s| s > 0.0), "detector pixel spacing must be positive, got {spacing:?}");
        let data = vec![0.0; size[0] * size[1] * n_projections];
        Self { size, n_projections, spacing, origin, offset: [0; 3], data }
    }

    /// A detector centred on the projection coordinate origin
    pub fn centered(size: [usize; 2], n_projections: usize, spacing: [f64; 2]) -> Self {
        let origin = [
            -(size[0] as f64 - 1.0) / 2.0 * spacing[0],
            -(size[1] as f64 - 1.0) / 2.0 * spacing[1],
        ];
        Self::zeros(size, n_projections, spacing, origin)
    }

    pub fn pixels_per_projection(&self) -> usize { self.size[0] * self.size[1] }

    /// Global projection indices covered by this buffer
    pub fn projection_range(&self) -> std::ops::Range<i64> {
        let first = self.offset[2] as i64;
        first..first + self.n_projections as i64
    }

    fn local_slice_index(&self, projection: usize) -> Result<usize> {
        let local = projection as i64 - self.offset[2] as i64;
        if local < 0 || local >= self.n_projections as i64 {
            return Err(Error::config(format!(
                "projection {projection} outside buffered range {:?}",
                self.projection_range()
            )));
        }
        Ok(local as usize)
    }

    /// Pixels of one projection, addressed by global projection index
    pub fn slice(&self, projection: usize) -> Result<&[Intensityf32]> {
        let local = self.local_slice_index(projection)?;
        let n = self.pixels_per_projection();
        Ok(&self.data[local * n..(local + 1) * n])
    }

    pub fn slice_mut(&mut self, projection: usize) -> Result<&mut [Intensityf32]> {
        let local = self.local_slice_index(projection)?;
        let n = self.pixels_per_projection();
        Ok(&mut self.data[local * n..(local + 1) * n])
    }

    /// Homogeneous matrix taking a buffer-local pixel index `(i, j, w)` to
    /// detector coordinates `(u, v, w)`; the depth axis passes through
    /// unchanged since the detector plane sits at `w = 0`.
    pub fn index_to_physical(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        for a in 0..2 {
            m[(a, a)] = self.spacing[a];
            m[(a, 3)] = self.origin[a];
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn slices_are_addressed_by_global_index() {
        let mut stack = ProjectionStack::zeros([2, 2], 3, [1.0; 2], [0.0; 2]);
        stack.offset[2] = 10;
        stack.slice_mut(11).unwrap().fill(4.0);
        assert_eq!(stack.slice(11).unwrap(), &[4.0; 4]);
        assert_eq!(stack.slice(10).unwrap(), &[0.0; 4]);
        assert!(stack.slice(13).is_err());
        assert!(stack.slice(9).is_err());
    }

    #[test]
    fn centered_detector_straddles_the_origin() {
        let stack = ProjectionStack::centered([128, 128], 1, [1.0; 2]);
        assert_eq!(stack.origin, [-63.5, -63.5]);
        // First and last pixel positions are symmetric about zero
        let m = stack.index_to_physical();
        let first = m.transform_point(&nalgebra::Point3::new(0.0, 0.0, 0.0));
        let last = m.transform_point(&nalgebra::Point3::new(127.0, 127.0, 0.0));
        assert_eq!(first.x, -last.x);
        assert_eq!(first.y, -last.y);
    }

    #[test]
    #[should_panic(expected = "spacing must be positive")]
    fn centered_rejects_non_positive_spacing() {
        ProjectionStack::centered([4, 4], 1, [1.0, 0.0]);
    }

    #[test]
    fn buffer_length_must_match_dimensions() {
        let bad = ProjectionStack::new([4, 4], 2, [1.0; 2], [0.0; 2], [0; 3], vec![0.0; 31]);
        assert!(matches!(bad, Err(Error::Config(_))));
    }
}
