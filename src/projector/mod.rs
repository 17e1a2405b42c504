//! Ray kernels: forward line integration and its adjoint splat, plus the
//! per-invocation machinery they share.
//!
//! Work inside one invocation is embarrassingly parallel over detector
//! pixels. The scatter hazard of the splat kernel is resolved by giving each
//! rayon worker its own accumulator volume and summing them afterwards, so
//! concurrent writes never alias; the float summation order across workers is
//! the one accepted source of last-bit nondeterminism.

pub use backward::{back_project, back_project_one};
pub use forward::{forward_project, forward_project_one};

pub mod backward;
pub mod forward;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::Result;
use crate::transform::ProjectionTransform;
use crate::volume::{Sampling, Volume};

/// Per-invocation kernel configuration. Explicit rather than module-level
/// state: the sampling convention changes both the matrix composition and the
/// kernels' interpolation consistently.
#[derive(Clone, Copy, Debug)]
pub struct ProjectorConfig {
    /// Ray-march increment in mm
    pub step_size: f64,
    pub sampling: Sampling,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self { step_size: 1.0, sampling: Sampling::GridCorner }
    }
}

impl ProjectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size > 0.0) {
            return Err(crate::Error::config(format!(
                "ray-march step size must be positive, got {}",
                self.step_size
            )));
        }
        Ok(())
    }
}

/// Everything a kernel needs, cast to single precision
pub(crate) struct KernelParams {
    matrix: Matrix4<f32>,
    source: Point3<f32>,
    box_min: Vector3<f32>,
    box_max: Vector3<f32>,
    spacing: Vector3<f32>,
    step: f32,
    pub(crate) sampling: Sampling,
}

impl KernelParams {
    pub(crate) fn new(
        transform: &ProjectionTransform,
        volume: &Volume,
        config: &ProjectorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (matrix, source) = transform.for_kernel()?;
        let (box_min, box_max) = volume.clip_box(config.sampling);
        Ok(Self {
            matrix,
            source,
            box_min,
            box_max,
            spacing: Vector3::new(
                volume.spacing[0] as f32,
                volume.spacing[1] as f32,
                volume.spacing[2] as f32,
            ),
            step: config.step_size as f32,
            sampling: config.sampling,
        })
    }

    /// Physical length represented by each sample along the ray
    pub(crate) fn step(&self) -> f32 { self.step }

    /// Set up the march for the ray through detector pixel `(u, v)`.
    /// `None` when the ray misses the clip box or the box lies entirely
    /// behind the source; those pixels contribute exactly zero.
    pub(crate) fn march(&self, u: usize, v: usize) -> Option<RaySteps> {
        let target = self.matrix.transform_point(&Point3::new(u as f32, v as f32, 0.0));
        let dir = target - self.source;
        let norm = dir.norm();
        if !(norm > 0.0) {
            return None;
        }
        let dir = dir / norm;
        let (entry, exit) = slab_intersect(&self.source, &dir, &self.box_min, &self.box_max)?;
        if exit < 0.0 {
            // Box entirely behind the source
            return None;
        }
        let entry = entry.max(0.0);
        let length_per_t = dir.component_mul(&self.spacing).norm();
        if !(length_per_t > 0.0) {
            return None;
        }
        Some(RaySteps {
            origin: self.source,
            dir,
            t: entry,
            t_exit: exit,
            dt: self.step / length_per_t,
        })
    }
}

/// Sample positions along a clipped ray, entry to exit inclusive
pub(crate) struct RaySteps {
    origin: Point3<f32>,
    dir: Vector3<f32>,
    t: f32,
    t_exit: f32,
    dt: f32,
}

impl Iterator for RaySteps {
    type Item = Point3<f32>;

    #[inline]
    fn next(&mut self) -> Option<Point3<f32>> {
        if self.t > self.t_exit {
            return None;
        }
        let p = self.origin + self.dir * self.t;
        self.t += self.dt;
        Some(p)
    }
}

/// Standard slab test of a ray against an axis-aligned box. Returns the
/// signed entry/exit distances, unclamped; `None` when there is no
/// intersection. A ray parallel to a slab intersects only if its origin lies
/// between that slab's faces.
pub(crate) fn slab_intersect(
    origin: &Point3<f32>,
    dir: &Vector3<f32>,
    box_min: &Vector3<f32>,
    box_max: &Vector3<f32>,
) -> Option<(f32, f32)> {
    let mut t_entry = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    for a in 0..3 {
        let o = origin[a];
        let d = dir[a];
        if d.abs() < 1e-9 {
            if o < box_min[a] || o > box_max[a] {
                return None;
            }
        } else {
            let t1 = (box_min[a] - o) / d;
            let t2 = (box_max[a] - o) / d;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_entry = t_entry.max(near);
            t_exit = t_exit.min(far);
        }
    }
    if t_entry > t_exit {
        None
    } else {
        Some((t_entry, t_exit))
    }
}

pub(crate) fn elementwise_add(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
    a.iter().zip(b.iter()).map(|(l, r)| l + r).collect()
}

/// One rayon job per worker: spawning smaller jobs makes rayon construct and
/// merge far too many whole-volume accumulators.
pub(crate) fn job_size(n_tasks: usize) -> usize {
    (n_tasks / rayon::current_num_threads().max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn unit_box() -> (Vector3<f32>, Vector3<f32>) {
        (Vector3::new(0.0, 0.0, 0.0), Vector3::new(10.0, 10.0, 10.0))
    }

    #[rstest(/**/     origin     ,       dir      , expected,
             // straight through the middle, along each axis
             case((-5.0, 5.0, 5.0), ( 1.0, 0.0, 0.0), Some((5.0, 15.0))),
             case(( 5.0,-5.0, 5.0), ( 0.0, 1.0, 0.0), Some((5.0, 15.0))),
             case(( 5.0, 5.0,20.0), ( 0.0, 0.0,-1.0), Some((10.0, 20.0))),
             // parallel to a slab, outside it
             case((-5.0,11.0, 5.0), ( 1.0, 0.0, 0.0), None),
             // pointing away: intersection entirely at negative t
             case((15.0, 5.0, 5.0), ( 1.0, 0.0, 0.0), Some((-15.0, -5.0))),
             // miss on a diagonal
             case((20.0,-1.0, 5.0), (-1.0, 0.0, 0.0), None),
    )]
    fn slab_cases(origin: (f32, f32, f32), dir: (f32, f32, f32), expected: Option<(f32, f32)>) {
        let (lo, hi) = unit_box();
        let o = Point3::new(origin.0, origin.1, origin.2);
        let d = Vector3::new(dir.0, dir.1, dir.2);
        let hit = slab_intersect(&o, &d, &lo, &hi);
        match (hit, expected) {
            (None, None) => (),
            (Some((a, b)), Some((c, d))) => {
                assert_float_eq!(a, c, abs <= 1e-5);
                assert_float_eq!(b, d, abs <= 1e-5);
            }
            other => panic!("expected {expected:?}, got {:?}", other.0),
        }
    }

    #[test]
    fn grazing_ray_touches_a_single_face_point() {
        let (lo, hi) = unit_box();
        let o = Point3::new(-5.0, 10.0, 5.0);
        let d = Vector3::new(1.0, 0.0, 0.0);
        let (entry, exit) = slab_intersect(&o, &d, &lo, &hi).unwrap();
        assert_float_eq!(entry, 5.0, abs <= 1e-5);
        assert_float_eq!(exit, 15.0, abs <= 1e-5);
    }

    // ---------------------------------------------------------------------
    use proptest::prelude::*;

    proptest! {
        // Entry never comes after exit, and both lie on the box surface
        #[test]
        fn slab_entry_and_exit_lie_on_the_box(
            ox in -50.0..50.0_f32, oy in -50.0..50.0_f32, oz in -50.0..50.0_f32,
            tx in  0.0..10.0_f32, ty in  0.0..10.0_f32, tz in  0.0..10.0_f32,
        ) {
            let (lo, hi) = unit_box();
            let o = Point3::new(ox, oy, oz);
            let target = Point3::new(tx, ty, tz);
            prop_assume!((target - o).norm() > 1e-3);
            let dir = (target - o).normalize();
            if let Some((entry, exit)) = slab_intersect(&o, &dir, &lo, &hi) {
                prop_assert!(entry <= exit);
                for t in [entry, exit] {
                    let p = o + dir * t;
                    for a in 0..3 {
                        prop_assert!(p[a] >= lo[a] - 1e-3 && p[a] <= hi[a] + 1e-3);
                    }
                }
            }
        }
    }
}
