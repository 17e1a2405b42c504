//! Motion model for 4D reconstruction: a cyclic sequence of per-voxel
//! displacement fields indexed by a continuous phase in `[0, 1)`.
//!
//! Fields live on the reconstruction volume's grid and store physical (mm)
//! displacements along the fixed-system axes. A projection's phase selects a
//! linear blend of the two bracketing frames, wrapping from the last frame
//! back to the first.

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::volume::{axis_support, local_coords, Sampling, Volume};

#[derive(Clone, Debug)]
pub struct DeformationField {
    /// Grid dimensions; must match the volume being warped
    pub size: [usize; 3],
    /// Per-voxel displacement in mm, x fastest
    pub data: Vec<[f32; 3]>,
}

impl DeformationField {
    pub fn new(size: [usize; 3], data: Vec<[f32; 3]>) -> Result<Self> {
        let n = size[0] * size[1] * size[2];
        if data.len() != n {
            return Err(Error::config(format!(
                "deformation field holds {} vectors but size {size:?} needs {n}",
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn zeros(size: [usize; 3]) -> Self {
        let [nx, ny, nz] = size;
        Self { size, data: vec![[0.0; 3]; nx * ny * nz] }
    }

    pub fn validate_grid(&self, volume: &Volume) -> Result<()> {
        if self.size != volume.size {
            return Err(Error::config(format!(
                "deformation field grid {:?} does not match volume grid {:?}",
                self.size, volume.size
            )));
        }
        Ok(())
    }

    /// Trilinear displacement at a continuous buffer-local position, clamped
    /// to the edges; same convention handling as volume sampling.
    pub fn sample(&self, p: Vector3<f32>, sampling: Sampling) -> Vector3<f32> {
        let q = local_coords(p, sampling);
        let [nx, ny, nz] = self.size;
        let (x0, x1, wx) = axis_support(q.x, nx);
        let (y0, y1, wy) = axis_support(q.y, ny);
        let (z0, z1, wz) = axis_support(q.z, nz);
        let flat = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
        let mut out = Vector3::zeros();
        for a in 0..3 {
            let v = |i, j, k| self.data[flat(i, j, k)][a];
            let c00 = v(x0, y0, z0) * (1.0 - wx) + v(x1, y0, z0) * wx;
            let c10 = v(x0, y1, z0) * (1.0 - wx) + v(x1, y1, z0) * wx;
            let c01 = v(x0, y0, z1) * (1.0 - wx) + v(x1, y0, z1) * wx;
            let c11 = v(x0, y1, z1) * (1.0 - wx) + v(x1, y1, z1) * wx;
            let c0 = c00 * (1.0 - wy) + c10 * wy;
            let c1 = c01 * (1.0 - wy) + c11 * wy;
            out[a] = c0 * (1.0 - wz) + c1 * wz;
        }
        out
    }
}

/// Cyclic family of displacement fields covering one motion period
#[derive(Clone, Debug)]
pub struct DeformationSequence {
    frames: Vec<DeformationField>,
}

impl DeformationSequence {
    pub fn new(frames: Vec<DeformationField>) -> Result<Self> {
        let first = match frames.first() {
            None => return Err(Error::config("deformation sequence needs at least one frame")),
            Some(f) => f.size,
        };
        if frames.iter().any(|f| f.size != first) {
            return Err(Error::config("deformation frames disagree on grid size"));
        }
        Ok(Self { frames })
    }

    pub fn n_frames(&self) -> usize { self.frames.len() }

    pub fn validate_grid(&self, volume: &Volume) -> Result<()> {
        self.frames[0].validate_grid(volume)
    }

    /// Field at a continuous phase: linear blend of the two bracketing
    /// frames, wrapping cyclically at phase 1.0
    pub fn interpolate(&self, phase: f64) -> Result<DeformationField> {
        if !phase.is_finite() {
            return Err(Error::config(format!("phase must be finite, got {phase}")));
        }
        let n = self.frames.len();
        let x = phase.rem_euclid(1.0) * n as f64;
        let lo = (x.floor() as usize).min(n - 1);
        let hi = (lo + 1) % n;
        let w = (x - lo as f64) as f32;
        let blend = self.frames[lo]
            .data
            .iter()
            .zip(self.frames[hi].data.iter())
            .map(|(a, b)| {
                [
                    a[0] * (1.0 - w) + b[0] * w,
                    a[1] * (1.0 - w) + b[1] * w,
                    a[2] * (1.0 - w) + b[2] * w,
                ]
            })
            .collect();
        DeformationField::new(self.frames[lo].size, blend)
    }
}
