use crate::enums::AlignMode;
use crate::error::{Error, Result};
use crate::volume::{Geometry, Volume};

use ndarray::{Array3, Zip};

/// Express `source` on `target`'s grid.
///
/// This is the only place in the crate where two independently produced
/// grids are reconciled; every voxel-wise combination of fields goes through
/// it first.
///
/// With [`AlignMode::ExactGrid`] the geometries must already agree within
/// [`crate::volume::GRID_TOLERANCE`] and the field is returned as-is; this is
/// the common case, since the scoring collaborator outputs on the grid it was
/// given. The interpolating modes resample; target voxels whose sample point
/// falls outside the source extent are filled with 0.0.
///
/// # Errors
///
/// [`Error::GridMismatch`] when geometries differ and no interpolation was
/// requested.
pub fn align(source: &Volume, target: &Geometry, mode: AlignMode) -> Result<Volume> {
    let src_geo = source.geometry();
    if src_geo.approx_eq(target) {
        return Ok(source.clone());
    }

    match mode {
        AlignMode::ExactGrid => Err(Error::GridMismatch(format!(
            "source {src_geo:?} differs from target {target:?} and no resampling was requested"
        ))),
        AlignMode::Nearest | AlignMode::Trilinear => {
            let (sz, sy, sx) = source.dim();
            if sz == 0 || sy == 0 || sx == 0 {
                return Err(Error::GridMismatch(format!(
                    "source field {src_geo:?} has no voxels to resample from"
                )));
            }
            Ok(resample(source, target, mode))
        }
    }
}

fn resample(source: &Volume, target: &Geometry, mode: AlignMode) -> Volume {
    let data = source.data();
    let src = source.geometry();
    let mut out = Array3::<f32>::zeros(target.dim);

    Zip::indexed(&mut out).par_for_each(|(i, j, k), value| {
        // Physical position of the target voxel center, then fractional
        // source index. Voxel (0,0,0) sits exactly at the origin.
        let mut t = [0.0f64; 3];
        for (axis, idx) in [(0usize, i), (1, j), (2, k)] {
            let p = target.origin[axis] + idx as f64 * target.spacing[axis];
            t[axis] = (p - src.origin[axis]) / src.spacing[axis];
        }
        *value = match mode {
            AlignMode::Nearest => nearest(data, t),
            AlignMode::Trilinear => trilinear(data, t),
            AlignMode::ExactGrid => unreachable!("handled by align"),
        };
    });

    Volume::with_origin(out, target.spacing, target.origin)
}

fn nearest(data: &Array3<f32>, t: [f64; 3]) -> f32 {
    let dim = data.dim();
    let n = [dim.0, dim.1, dim.2];
    let mut idx = [0usize; 3];
    for axis in 0..3 {
        let r = t[axis].round();
        if r < 0.0 || r > (n[axis] - 1) as f64 {
            return 0.0;
        }
        idx[axis] = r as usize;
    }
    data[[idx[0], idx[1], idx[2]]]
}

fn trilinear(data: &Array3<f32>, t: [f64; 3]) -> f32 {
    let dim = data.dim();
    let n = [dim.0, dim.1, dim.2];
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0.0f64; 3];
    for axis in 0..3 {
        if t[axis] < 0.0 || t[axis] > (n[axis] - 1) as f64 {
            return 0.0;
        }
        let floor = t[axis].floor();
        lo[axis] = floor as usize;
        hi[axis] = (lo[axis] + 1).min(n[axis] - 1);
        frac[axis] = t[axis] - floor;
    }

    let mut acc = 0.0f64;
    for (zi, wz) in [(lo[0], 1.0 - frac[0]), (hi[0], frac[0])] {
        for (yi, wy) in [(lo[1], 1.0 - frac[1]), (hi[1], frac[1])] {
            for (xi, wx) in [(lo[2], 1.0 - frac[2]), (hi[2], frac[2])] {
                acc += data[[zi, yi, xi]] as f64 * wz * wy * wx;
            }
        }
    }
    acc as f32
}

/// Inverse-distance weighted sample of the field near a physical point
/// (canonical (slice, row, col) mm coordinates).
///
/// Only voxel centers within `radius` mm contribute. Returns `None` when no
/// sample lies within the support radius, so a missing sample is never
/// confused with a true zero value.
pub fn sample_near(volume: &Volume, point: [f64; 3], radius: f64) -> Option<f32> {
    let geo = volume.geometry();
    let n = [geo.dim.0, geo.dim.1, geo.dim.2];
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    for axis in 0..3 {
        let start = (point[axis] - radius - geo.origin[axis]) / geo.spacing[axis];
        let end = (point[axis] + radius - geo.origin[axis]) / geo.spacing[axis];
        if end < 0.0 || start > (n[axis] - 1) as f64 {
            return None;
        }
        lo[axis] = start.ceil().max(0.0) as usize;
        hi[axis] = (end.floor() as usize).min(n[axis] - 1);
        if lo[axis] > hi[axis] {
            return None;
        }
    }

    let data = volume.data();
    let r2 = radius * radius;
    let mut weighted = 0.0f64;
    let mut total_weight = 0.0f64;
    for zi in lo[0]..=hi[0] {
        for yi in lo[1]..=hi[1] {
            for xi in lo[2]..=hi[2] {
                let mut d2 = 0.0f64;
                for (axis, idx) in [(0usize, zi), (1, yi), (2, xi)] {
                    let c = geo.origin[axis] + idx as f64 * geo.spacing[axis];
                    d2 += (c - point[axis]).powi(2);
                }
                if d2 > r2 {
                    continue;
                }
                let d = d2.sqrt();
                if d < 1e-12 {
                    return Some(data[[zi, yi, xi]]);
                }
                let w = 1.0 / d;
                weighted += data[[zi, yi, xi]] as f64 * w;
                total_weight += w;
            }
        }
    }

    if total_weight == 0.0 {
        None
    } else {
        Some((weighted / total_weight) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp() -> Volume {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as f32);
        Volume::new(data, [1.0, 1.0, 1.0])
    }

    #[test]
    fn matching_grids_pass_through_unchanged() {
        let vol = ramp();
        let aligned = align(&vol, &vol.geometry(), AlignMode::ExactGrid).unwrap();
        assert_eq!(aligned.data(), vol.data());
    }

    #[test]
    fn mismatched_grids_need_a_resample_mode() {
        let vol = ramp();
        let mut target = vol.geometry();
        target.origin[0] += 0.5;
        let result = align(&vol, &target, AlignMode::ExactGrid);
        assert!(matches!(result, Err(Error::GridMismatch(_))));
        assert!(align(&vol, &target, AlignMode::Trilinear).is_ok());
    }

    #[test]
    fn trilinear_interpolates_voxel_midpoints() {
        let vol = ramp();
        let target = Geometry {
            dim: (1, 1, 1),
            spacing: [1.0, 1.0, 1.0],
            origin: [0.5, 0.5, 0.5],
        };
        let aligned = align(&vol, &target, AlignMode::Trilinear).unwrap();
        // center of the 2x2x2 ramp averages all eight corners
        assert!((aligned.data()[[0, 0, 0]] - 3.5).abs() < 1e-6);
    }

    #[test]
    fn nearest_picks_the_closest_voxel_center() {
        let vol = ramp();
        let target = Geometry {
            dim: (1, 1, 1),
            spacing: [1.0, 1.0, 1.0],
            origin: [0.9, 0.1, 0.9],
        };
        let aligned = align(&vol, &target, AlignMode::Nearest).unwrap();
        assert_eq!(aligned.data()[[0, 0, 0]], 5.0);
    }

    #[test]
    fn empty_source_cannot_be_resampled() {
        let empty = Volume::new(Array3::zeros((0, 1, 1)), [1.0, 1.0, 1.0]);
        let target = Geometry {
            dim: (1, 1, 1),
            spacing: [1.0, 1.0, 1.0],
            origin: [0.0, 0.0, 0.0],
        };
        for mode in [AlignMode::Nearest, AlignMode::Trilinear] {
            assert!(matches!(
                align(&empty, &target, mode),
                Err(Error::GridMismatch(_))
            ));
        }
    }

    #[test]
    fn out_of_extent_targets_are_zero_filled() {
        let vol = ramp();
        let target = Geometry {
            dim: (1, 1, 1),
            spacing: [1.0, 1.0, 1.0],
            origin: [10.0, 10.0, 10.0],
        };
        let aligned = align(&vol, &target, AlignMode::Trilinear).unwrap();
        assert_eq!(aligned.data()[[0, 0, 0]], 0.0);
    }

    #[test]
    fn sample_near_returns_none_outside_support() {
        let vol = ramp();
        assert!(sample_near(&vol, [50.0, 50.0, 50.0], 2.0).is_none());
        let sampled = sample_near(&vol, [0.0, 0.0, 0.0], 0.5).unwrap();
        assert_eq!(sampled, 0.0);
    }

    #[test]
    fn sample_near_weights_by_inverse_distance() {
        let vol = ramp();
        // halfway between voxels (0,0,0)=0 and (0,0,1)=1 on the x axis
        let sampled = sample_near(&vol, [0.0, 0.0, 0.5], 0.6).unwrap();
        assert!((sampled - 0.5).abs() < 1e-6);
    }
}
