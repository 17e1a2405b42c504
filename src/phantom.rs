//! Synthetic phantoms: simple analytic shapes rasterized into a volume at
//! voxel-centre positions, for exercising the projectors without any file
//! input.

use itertools::iproduct;

use crate::volume::Volume;

#[derive(Clone, Copy, Debug)]
pub struct Ellipsoid {
    /// Centre in physical coordinates (mm)
    pub center: [f64; 3],
    pub semi_axes: [f64; 3],
    pub density: f32,
}

/// Add the ellipsoid's density to every voxel whose centre lies inside it
pub fn draw_ellipsoid(volume: &mut Volume, e: &Ellipsoid) {
    draw(volume, e.density, |p| {
        let mut q = -1.0;
        for a in 0..3 {
            let d = (p[a] - e.center[a]) / e.semi_axes[a];
            q += d * d;
        }
        q <= 0.0
    })
}

/// Add `density` to every voxel whose centre lies inside the axis-aligned box
pub fn draw_box(volume: &mut Volume, center: [f64; 3], half_width: [f64; 3], density: f32) {
    draw(volume, density, |p| {
        (0..3).all(|a| (p[a] - center[a]).abs() <= half_width[a])
    })
}

fn draw(volume: &mut Volume, density: f32, inside: impl Fn([f64; 3]) -> bool) {
    let [nx, ny, nz] = volume.size;
    for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
        let p = [
            volume.origin[0] + i as f64 * volume.spacing[0],
            volume.origin[1] + j as f64 * volume.spacing[1],
            volume.origin[2] + k as f64 * volume.spacing[2],
        ];
        if inside(p) {
            let n = volume.flat([i, j, k]);
            volume.data[n] += density;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn ellipsoid_fills_roughly_its_analytic_volume() {
        let mut v = Volume::zeros([40, 40, 40], [1.0; 3], [-19.5; 3]);
        let e = Ellipsoid { center: [0.0; 3], semi_axes: [10.0; 3], density: 1.0 };
        draw_ellipsoid(&mut v, &e);
        let filled = v.data.iter().filter(|&&d| d > 0.0).count() as f64;
        let analytic = 4.0 / 3.0 * std::f64::consts::PI * 1000.0;
        assert!((filled - analytic).abs() / analytic < 0.05);
    }

    #[test]
    fn box_respects_its_bounds() {
        let mut v = Volume::zeros([10, 10, 10], [1.0; 3], [-4.5; 3]);
        draw_box(&mut v, [0.0; 3], [1.0; 3], 2.0);
        // 3 voxel centres per axis fall in [-1, 1]: at -1, 0, +1
        let filled = v.data.iter().filter(|&&d| d == 2.0).count();
        assert_eq!(filled, 27);
    }

    #[test]
    fn densities_accumulate() {
        let mut v = Volume::zeros([4, 4, 4], [1.0; 3], [-1.5; 3]);
        draw_box(&mut v, [0.0; 3], [5.0; 3], 1.0);
        draw_box(&mut v, [0.0; 3], [5.0; 3], 0.5);
        assert!(v.data.iter().all(|&d| d == 1.5));
    }
}
