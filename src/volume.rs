use crate::enums::Orientation;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

/// Relative tolerance used when comparing grid geometries.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Physical description of a voxel grid in canonical (slice, row, col) order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    /// Voxel counts (slices, rows, cols).
    pub dim: (usize, usize, usize),
    /// Voxel size in mm (slice, row, col).
    pub spacing: [f64; 3],
    /// Physical coordinate of voxel (0, 0, 0) in mm (slice, row, col).
    pub origin: [f64; 3],
}

fn approx(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= GRID_TOLERANCE * scale
}

impl Geometry {
    /// Whether two grids coincide: identical voxel counts, spacing and origin
    /// within [`GRID_TOLERANCE`] relative error.
    pub fn approx_eq(&self, other: &Geometry) -> bool {
        self.dim == other.dim
            && self
                .spacing
                .iter()
                .zip(&other.spacing)
                .all(|(&a, &b)| approx(a, b))
            && self
                .origin
                .iter()
                .zip(&other.origin)
                .all(|(&a, &b)| approx(a, b))
    }

    /// Physical extent along each canonical axis in mm.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.dim.0 as f64 * self.spacing[0],
            self.dim.1 as f64 * self.spacing[1],
            self.dim.2 as f64 * self.spacing[2],
        ]
    }

    /// Voxel counts in external (col, row, slice) = (x, y, z) order.
    pub fn dim_xyz(&self) -> (usize, usize, usize) {
        (self.dim.2, self.dim.1, self.dim.0)
    }

    /// Spacing in external (x, y, z) order.
    pub fn spacing_xyz(&self) -> [f64; 3] {
        [self.spacing[2], self.spacing[1], self.spacing[0]]
    }

    /// Origin in external (x, y, z) order.
    pub fn origin_xyz(&self) -> [f64; 3] {
        [self.origin[2], self.origin[1], self.origin[0]]
    }
}

/// Intensity window mapping a scalar range onto 8-bit grey for display.
#[derive(Clone, Copy, Debug)]
pub struct Window {
    pub center: f32,
    pub width: f32,
}

impl Window {
    /// Window spanning the full value range of a field.
    pub fn full_range(volume: &Volume) -> Self {
        let (min, max) = volume.value_range();
        Self {
            center: (min + max) / 2.0,
            width: (max - min).max(1.0),
        }
    }

    #[inline]
    fn to_u8(self, value: f32) -> u8 {
        let low = self.center - self.width / 2.0;
        (((value - low) / self.width) * 255.0).clamp(0.0, 255.0) as u8
    }
}

/// A reconstructed 3D scalar field with its physical grid description.
///
/// Data is stored in exactly one canonical axis order, (slice, row, col) =
/// (z, y, x), and is immutable once built: every derived product (mask,
/// aligned copy, masked field) is a new value.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array3<f32>,
    spacing: [f64; 3],
    origin: [f64; 3],
}

impl Volume {
    /// Build a volume with the grid origin at voxel (0, 0, 0).
    ///
    /// Spacing is (slice, row, col) in mm and must be strictly positive;
    /// violations are a programming error in the caller, so this asserts.
    pub fn new(data: Array3<f32>, spacing: [f64; 3]) -> Self {
        Self::with_origin(data, spacing, [0.0; 3])
    }

    /// Build a volume with an explicit origin (slice, row, col) in mm.
    pub fn with_origin(data: Array3<f32>, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        assert!(
            spacing.iter().all(|&s| s > 0.0),
            "voxel spacing must be strictly positive, got {spacing:?}"
        );
        Self {
            data,
            spacing,
            origin,
        }
    }

    /// Build a volume whose physical extent is centered on the coordinate
    /// origin, the convention the scoring collaborator expects.
    pub fn centered(data: Array3<f32>, spacing: [f64; 3]) -> Self {
        let dim = data.dim();
        let origin = [
            -(dim.0 as f64 * spacing[0]) / 2.0,
            -(dim.1 as f64 * spacing[1]) / 2.0,
            -(dim.2 as f64 * spacing[2]) / 2.0,
        ];
        Self::with_origin(data, spacing, origin)
    }

    /// Voxel counts in canonical (slices, rows, cols) order.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Spacing in canonical (slice, row, col) order, mm.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Origin in canonical (slice, row, col) order, mm.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// The grid this field is defined on.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            dim: self.dim(),
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Consume the volume, yielding the raw array.
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    /// Minimum and maximum value over the whole field (0.0 for an empty one).
    pub fn value_range(&self) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }

    /// 2D view through the volume along a medical axis.
    pub fn slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let view = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(view)
    }

    /// Render one slice as an 8-bit greyscale image under the given window.
    ///
    /// This is terminal reporting output; the caller hands the buffer to an
    /// external renderer or saves it to disk.
    pub fn slice_image(
        &self,
        index: usize,
        orientation: Orientation,
        window: Window,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.slice_from_axis(index, orientation)?;
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice.into_par_iter().map(|&v| window.to_u8(v)).collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}
