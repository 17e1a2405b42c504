//! Per-study acquisition geometry: one pose per projection, each relating the
//! fixed physical coordinate system to the detector.
//!
//! Detector coordinates are `(u, v, w)`: `u`, `v` in the detector plane,
//! `w` along the detector normal with the plane at `w = 0` and the source on
//! the positive side. The stored matrix is the rigid transform from the fixed
//! system into those coordinates, so it is invertible; perspective appears
//! only once rays are formed between the source and detector points.

use nalgebra::{Matrix4, Vector4};

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct ProjectionPose {
    /// Fixed-system physical coordinates to detector coordinates
    pub fixed_to_projection: Matrix4<f64>,
    /// Source position in the fixed system, homogeneous. The fourth
    /// coordinate is normally 1; values near zero describe a source at
    /// infinity, which this core rejects.
    pub source: Vector4<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct Geometry {
    poses: Vec<ProjectionPose>,
}

impl Geometry {
    pub fn new() -> Self { Self::default() }

    pub fn n_projections(&self) -> usize { self.poses.len() }

    pub fn add_projection(&mut self, fixed_to_projection: Matrix4<f64>, source: Vector4<f64>) {
        self.poses.push(ProjectionPose { fixed_to_projection, source });
    }

    pub fn pose(&self, projection: usize) -> Result<&ProjectionPose> {
        self.poses.get(projection).ok_or_else(|| Error::geometry(format!(
            "projection {projection} out of range: geometry describes {} projections",
            self.poses.len()
        )))
    }

    /// Detector coordinates back to the fixed system, for the given
    /// projection. Fails fast on a singular pose instead of letting NaNs
    /// propagate through the ray kernels.
    pub fn projection_to_fixed(&self, projection: usize) -> Result<Matrix4<f64>> {
        let pose = self.pose(projection)?;
        pose.fixed_to_projection.try_inverse().ok_or_else(|| Error::geometry(format!(
            "fixed-to-projection matrix of projection {projection} is singular"
        )))
    }

    /// Circular source/detector trajectory: the source orbits the isocenter
    /// in the y-normal plane at distance `sid`, with a flat detector at
    /// distance `sdd` from the source, optionally shifted in-plane by
    /// `(offset_u, offset_v)`.
    pub fn circular(
        gantry_angles_deg: impl IntoIterator<Item = f64>,
        sid: f64,
        sdd: f64,
        offset_u: f64,
        offset_v: f64,
    ) -> Self {
        let mut geometry = Self::new();
        for deg in gantry_angles_deg {
            let ga = deg.to_radians();
            // Detector-to-fixed is R_y(ga) * T(offset, sid - sdd); store its
            // inverse, built analytically.
            let mut rot_back = Matrix4::identity();
            let (s, c) = (-ga).sin_cos();
            rot_back[(0, 0)] = c;
            rot_back[(0, 2)] = s;
            rot_back[(2, 0)] = -s;
            rot_back[(2, 2)] = c;
            let mut untranslate = Matrix4::identity();
            untranslate[(0, 3)] = -offset_u;
            untranslate[(1, 3)] = -offset_v;
            untranslate[(2, 3)] = sdd - sid;
            let source = Vector4::new(sid * ga.sin(), 0.0, sid * ga.cos(), 1.0);
            geometry.add_projection(untranslate * rot_back, source);
        }
        geometry
    }
}
