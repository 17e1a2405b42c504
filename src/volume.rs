//! The reconstructed 3D grid: sample buffer plus the index-space metadata
//! (spacing, origin, buffer offset) needed to map between physical points and
//! voxel indices.
//!
//! Two sampling conventions are supported. In the grid-center convention a
//! voxel's index denotes its centre; in the grid-corner convention every
//! coordinate is shifted up by half a voxel, which is the convention used by
//! hardware texture interpolation. The composed projection matrix and the
//! kernels must agree on the convention, so it travels with every invocation
//! rather than living in global state.

use nalgebra::{Matrix4, Vector3};

use crate::error::{Error, Result};

pub type Intensityf32 = f32;

/// Where a voxel's index lives geometrically: at its centre, or at its corner
/// (half a voxel lower along each axis).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sampling {
    GridCorner,
    GridCenter,
}

#[derive(Clone, Debug)]
pub struct Volume {
    /// Voxel counts per axis, x fastest in the flat buffer
    pub size: [usize; 3],
    /// Physical voxel pitch in mm
    pub spacing: [f64; 3],
    /// Physical position of the voxel with zero buffer-local index
    pub origin: [f64; 3],
    /// Index-space offset of the buffer relative to the logical image origin
    pub offset: [i32; 3],
    pub data: Vec<Intensityf32>,
}

impl Volume {
    pub fn new(
        size: [usize; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        offset: [i32; 3],
        data: Vec<Intensityf32>,
    ) -> Result<Self> {
        if spacing.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::config(format!("volume spacing must be positive, got {spacing:?}")));
        }
        let n = size[0] * size[1] * size[2];
        if data.len() != n {
            return Err(Error::config(format!(
                "volume buffer holds {} samples but size {size:?} needs {n}",
                data.len()
            )));
        }
        Ok(Self { size, spacing, origin, offset, data })
    }

    /// Panics on non-positive spacing; use [`Self::new`] for a fallible check
    pub fn zeros(size: [usize; 3], spacing: [f64; 3], origin: [f64; 3]) -> Self {
        assert!(spacing.iter().all(|&s| s > 0.0), "volume spacing must be positive, got {spacing:?}");
        let [nx, ny, nz] = size;
        Self { size, spacing, origin, offset: [0; 3], data: vec![0.0; nx * ny * nz] }
    }

    /// Panics on non-positive spacing; use [`Self::new`] for a fallible check
    pub fn ones(size: [usize; 3], spacing: [f64; 3], origin: [f64; 3]) -> Self {
        assert!(spacing.iter().all(|&s| s > 0.0), "volume spacing must be positive, got {spacing:?}");
        let [nx, ny, nz] = size;
        Self { size, spacing, origin, offset: [0; 3], data: vec![1.0; nx * ny * nz] }
    }

    pub fn n_voxels(&self) -> usize { self.size[0] * self.size[1] * self.size[2] }

    /// Position of the buffer-local index `[i, j, k]` in the flat buffer
    #[inline]
    pub fn flat(&self, [i, j, k]: [usize; 3]) -> usize {
        i + self.size[0] * (j + self.size[1] * k)
    }

    /// Homogeneous matrix taking a buffer-local voxel index to a physical point
    pub fn index_to_physical(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        for a in 0..3 {
            m[(a, a)] = self.spacing[a];
            m[(a, 3)] = self.origin[a];
        }
        m
    }

    /// Inverse of [`Self::index_to_physical`]; construction guarantees the
    /// spacing is non-degenerate, but a singular matrix is still reported
    /// rather than silently producing NaNs.
    pub fn physical_to_index(&self) -> Result<Matrix4<f64>> {
        self.index_to_physical()
            .try_inverse()
            .ok_or_else(|| Error::geometry(format!(
                "volume index-to-physical matrix is singular (spacing {:?})",
                self.spacing
            )))
    }

    /// Axis-aligned bounding box used for ray clipping, in buffer-local
    /// coordinates of the given convention. The box spans the region where
    /// trilinear interpolation has full support, `[0.5, size - 0.5]` per axis
    /// in grid-corner coordinates, half a voxel lower in grid-center ones.
    pub fn clip_box(&self, sampling: Sampling) -> (Vector3<f32>, Vector3<f32>) {
        let shift = match sampling {
            Sampling::GridCorner => 0.5,
            Sampling::GridCenter => 0.0,
        };
        let lo = Vector3::repeat(shift);
        let hi = Vector3::new(
            self.size[0] as f32 - 1.0 + shift,
            self.size[1] as f32 - 1.0 + shift,
            self.size[2] as f32 - 1.0 + shift,
        );
        (lo, hi)
    }

    /// Trilinear sample at a continuous buffer-local position, clamping to the
    /// edge voxels. A grid-corner position of exactly `0.5` reads voxel 0 with
    /// full weight.
    pub fn sample(&self, p: Vector3<f32>, sampling: Sampling) -> f32 {
        let q = local_coords(p, sampling);
        let [nx, ny, nz] = self.size;
        let (x0, x1, wx) = axis_support(q.x, nx);
        let (y0, y1, wy) = axis_support(q.y, ny);
        let (z0, z1, wz) = axis_support(q.z, nz);
        let v = |i, j, k| self.data[self.flat([i, j, k])];
        let c00 = v(x0, y0, z0) * (1.0 - wx) + v(x1, y0, z0) * wx;
        let c10 = v(x0, y1, z0) * (1.0 - wx) + v(x1, y1, z0) * wx;
        let c01 = v(x0, y0, z1) * (1.0 - wx) + v(x1, y0, z1) * wx;
        let c11 = v(x0, y1, z1) * (1.0 - wx) + v(x1, y1, z1) * wx;
        let c0 = c00 * (1.0 - wy) + c10 * wy;
        let c1 = c01 * (1.0 - wy) + c11 * wy;
        c0 * (1.0 - wz) + c1 * wz
    }

    /// Add `delta` element-wise into this volume's buffer. Sizes must match;
    /// callers construct deltas from this volume's own metadata.
    pub fn accumulate(&mut self, delta: &[Intensityf32]) {
        debug_assert_eq!(self.data.len(), delta.len());
        ndarray::azip!((v in &mut self.data[..], &d in delta) *v += d);
    }

    pub fn total(&self) -> f64 { self.data.iter().map(|&v| v as f64).sum() }
}

/// Shift a kernel-space position into grid-center buffer-local coordinates
#[inline]
pub(crate) fn local_coords(p: Vector3<f32>, sampling: Sampling) -> Vector3<f32> {
    match sampling {
        Sampling::GridCorner => p - Vector3::repeat(0.5),
        Sampling::GridCenter => p,
    }
}

/// Neighbouring sample indices along one axis, clamped to the edges, with the
/// interpolation weight of the upper neighbour.
#[inline]
pub(crate) fn axis_support(q: f32, n: usize) -> (usize, usize, f32) {
    let f = q.floor();
    let i = f as i64;
    let hi = n as i64 - 1;
    let lo = i.clamp(0, hi) as usize;
    let up = (i + 1).clamp(0, hi) as usize;
    (lo, up, q - f)
}

/// Trilinear scatter: the adjoint of [`Volume::sample`]. Distributes `value`
/// over the eight voxels surrounding `p` with the same clamped weights the
/// gather uses, so forward and back projection remain adjoint at the edges.
pub(crate) fn splat(
    data: &mut [Intensityf32],
    size: [usize; 3],
    p: Vector3<f32>,
    sampling: Sampling,
    value: f32,
) {
    let q = local_coords(p, sampling);
    let [nx, ny, nz] = size;
    let (x0, x1, wx) = axis_support(q.x, nx);
    let (y0, y1, wy) = axis_support(q.y, ny);
    let (z0, z1, wz) = axis_support(q.z, nz);
    let flat = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
    data[flat(x0, y0, z0)] += value * (1.0 - wx) * (1.0 - wy) * (1.0 - wz);
    data[flat(x1, y0, z0)] += value * wx * (1.0 - wy) * (1.0 - wz);
    data[flat(x0, y1, z0)] += value * (1.0 - wx) * wy * (1.0 - wz);
    data[flat(x1, y1, z0)] += value * wx * wy * (1.0 - wz);
    data[flat(x0, y0, z1)] += value * (1.0 - wx) * (1.0 - wy) * wz;
    data[flat(x1, y0, z1)] += value * wx * (1.0 - wy) * wz;
    data[flat(x0, y1, z1)] += value * (1.0 - wx) * wy * wz;
    data[flat(x1, y1, z1)] += value * wx * wy * wz;
}
