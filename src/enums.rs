/// Medical viewing axis through the canonical (slice, row, col) array.
#[derive(Clone, Copy, Debug)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Resampling policy for reconciling two grids.
#[derive(Clone, Copy, Debug, Default)]
pub enum AlignMode {
    /// Geometries must already agree within tolerance; no interpolation.
    #[default]
    ExactGrid,
    /// Nearest-voxel lookup on the target grid.
    Nearest,
    /// Trilinear interpolation on the target grid.
    Trilinear,
}

/// Reduction applied to a field restricted to a mask.
#[derive(Clone, Copy, Debug)]
pub enum Reduction {
    Sum,
    Mean,
    Max,
    Count,
}
