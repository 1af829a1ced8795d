use crate::error::{Error, Result};
use crate::volume::{GRID_TOLERANCE, Volume};

use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};

/// One decoded 2D cross-section with its physical metadata.
///
/// Produced by the external DICOM decoder, read-only afterwards, and
/// consumed when the volume is built.
#[derive(Clone, Debug)]
pub struct SliceRecord {
    /// Raw stored samples, (rows, cols). The modality rescale has NOT been
    /// applied yet. Unsigned storage only; series with signed stored pixels
    /// (PixelRepresentation = 1) are not decoded.
    pub pixels: Array2<u16>,
    /// Physical coordinate along the stacking axis (mm). The sole sort key;
    /// SliceLocation is deliberately not used because it is less reliable.
    pub position_z: f64,
    /// Physical pixel size along the row (Y) axis, mm.
    pub row_spacing: f64,
    /// Physical pixel size along the column (X) axis, mm.
    pub col_spacing: f64,
    /// Physical spacing along the stacking axis, mm.
    pub thickness: f64,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
}

/// Reconstructs a [`Volume`] of Hounsfield Units from a set of slices.
///
/// Shared by every entry point so the reconstruction logic exists exactly
/// once.
pub struct VolumeBuilder;

impl VolumeBuilder {
    /// Read all `.dcm` files in a directory into slice records.
    ///
    /// # Errors
    ///
    /// [`Error::NoInputFiles`] if the directory is unreadable or holds no
    /// `.dcm` files; decoding errors from the individual files otherwise.
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Vec<SliceRecord>> {
        let path = path.as_ref();
        let paths: Vec<_> = fs::read_dir(path)
            .map_err(|_| Error::NoInputFiles(path.to_path_buf()))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(Error::NoInputFiles(path.to_path_buf()));
        }

        let objects: Result<Vec<_>> = paths
            .iter()
            .map(|p| open_file(p).map_err(Error::from))
            .collect();
        Self::from_dicom_objects(&objects?)
    }

    /// Extract slice records from already-opened DICOM objects.
    pub fn from_dicom_objects(
        objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Result<Vec<SliceRecord>> {
        objects.iter().map(Self::extract_record).collect()
    }

    /// Reconstruct the HU volume from a set of slice records.
    ///
    /// Slices are sorted ascending by `position_z` with a stable sort, so
    /// slices sharing a z coordinate keep their input order. The output
    /// array is (slice, row, col) with spacing
    /// `[thickness, row_spacing, col_spacing]`; each sample is mapped through
    /// `raw * slope + intercept` in f64 and stored as f32.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] for an empty set;
    /// [`Error::InconsistentGeometry`] when any slice disagrees with the
    /// first on pixel counts or spacing.
    pub fn build(mut slices: Vec<SliceRecord>) -> Result<Volume> {
        let first = slices.first().ok_or(Error::EmptyInput)?;
        let shape = first.pixels.dim();
        let spacing = [first.thickness, first.row_spacing, first.col_spacing];
        Self::validate_geometry(&slices, shape, spacing)?;

        slices.sort_by(|a, b| {
            a.position_z
                .partial_cmp(&b.position_z)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (rows, cols) = shape;
        let mut data = Array3::<f32>::zeros((slices.len(), rows, cols));
        for (i, slice) in slices.iter().enumerate() {
            let hu = slice
                .pixels
                .mapv(|raw| (raw as f64 * slice.rescale_slope + slice.rescale_intercept) as f32);
            data.slice_mut(s![i, .., ..]).assign(&hu);
        }

        Ok(Volume::new(data, spacing))
    }

    fn validate_geometry(
        slices: &[SliceRecord],
        shape: (usize, usize),
        spacing: [f64; 3],
    ) -> Result<()> {
        for (i, slice) in slices.iter().enumerate() {
            if slice.pixels.dim() != shape {
                return Err(Error::InconsistentGeometry(format!(
                    "slice {} has {:?} pixels, expected {:?}",
                    i,
                    slice.pixels.dim(),
                    shape
                )));
            }
            let candidate = [slice.thickness, slice.row_spacing, slice.col_spacing];
            if candidate.iter().any(|&s| s <= 0.0) {
                return Err(Error::InconsistentGeometry(format!(
                    "slice {i} has non-positive spacing {candidate:?}"
                )));
            }
            for (axis, (&a, &b)) in spacing.iter().zip(&candidate).enumerate() {
                let scale = a.abs().max(b.abs()).max(1.0);
                if (a - b).abs() > GRID_TOLERANCE * scale {
                    return Err(Error::InconsistentGeometry(format!(
                        "slice {i} spacing {candidate:?} disagrees with {spacing:?} on axis {axis}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn extract_record(object: &FileDicomObject<InMemDicomObject>) -> Result<SliceRecord> {
        let position_z = object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()
            .and_then(|e| e.to_multi_float64().ok())
            .and_then(|p| p.get(2).copied())
            .ok_or(Error::MissingMetadata("ImagePositionPatient"))?;

        // PixelSpacing is (row, col) per the DICOM standard.
        let pixel_spacing = object
            .element(tags::PIXEL_SPACING)
            .ok()
            .and_then(|e| e.to_multi_float64().ok())
            .filter(|p| p.len() >= 2)
            .ok_or(Error::MissingMetadata("PixelSpacing"))?;

        let thickness = object
            .element(tags::SLICE_THICKNESS)
            .ok()
            .and_then(|e| e.to_float64().ok())
            .ok_or(Error::MissingMetadata("SliceThickness"))?;

        let decoded = object
            .decode_pixel_data()
            .ok()
            .ok_or(Error::MissingMetadata("PixelData"))?;

        let rescale = decoded
            .rescale()
            .ok()
            .and_then(|r| r.first().cloned())
            .ok_or(Error::MissingMetadata("RescaleSlope/RescaleIntercept"))?;

        // Raw stored samples: keep the modality LUT out of the conversion,
        // the builder applies the rescale itself.
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let pixels = decoded
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .ok_or(Error::MissingMetadata("PixelData"))?;

        Ok(SliceRecord {
            pixels,
            position_z,
            row_spacing: pixel_spacing[0],
            col_spacing: pixel_spacing[1],
            thickness,
            rescale_slope: rescale.slope,
            rescale_intercept: rescale.intercept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn record(position_z: f64, base: u16) -> SliceRecord {
        SliceRecord {
            pixels: arr2(&[[base, base + 1], [base + 2, base + 3]]),
            position_z,
            row_spacing: 0.5,
            col_spacing: 0.7,
            thickness: 2.0,
            rescale_slope: 1.0,
            rescale_intercept: -1024.0,
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            VolumeBuilder::build(Vec::new()),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn slices_are_ordered_by_position() {
        // Storage order {10, 0, 5} must come out as {0, 5, 10}.
        let slices = vec![record(10.0, 3000), record(0.0, 1000), record(5.0, 2000)];
        let volume = VolumeBuilder::build(slices).unwrap();
        assert_eq!(volume.dim(), (3, 2, 2));
        assert_eq!(volume.data()[[0, 0, 0]], 1000.0 - 1024.0);
        assert_eq!(volume.data()[[1, 0, 0]], 2000.0 - 1024.0);
        assert_eq!(volume.data()[[2, 0, 0]], 3000.0 - 1024.0);
    }

    #[test]
    fn rescale_maps_raw_1024_to_zero_hu() {
        let volume = VolumeBuilder::build(vec![record(0.0, 1024)]).unwrap();
        assert_eq!(volume.data()[[0, 0, 0]], 0.0);
    }

    #[test]
    fn spacing_follows_canonical_order() {
        let volume = VolumeBuilder::build(vec![record(0.0, 0)]).unwrap();
        assert_eq!(volume.spacing(), [2.0, 0.5, 0.7]);
        let extent = volume.geometry().extent();
        assert_eq!(extent, [2.0, 1.0, 1.4]);
    }

    #[test]
    fn shuffled_input_builds_identical_volume() {
        let sorted = vec![record(0.0, 10), record(5.0, 20), record(10.0, 30)];
        let shuffled = vec![record(5.0, 20), record(10.0, 30), record(0.0, 10)];
        let a = VolumeBuilder::build(sorted).unwrap();
        let b = VolumeBuilder::build(shuffled).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(a.spacing(), b.spacing());
    }

    #[test]
    fn stable_sort_keeps_input_order_for_ties() {
        let mut first = record(0.0, 1);
        first.pixels = arr2(&[[1, 1], [1, 1]]);
        let mut second = record(0.0, 2);
        second.pixels = arr2(&[[2, 2], [2, 2]]);
        let volume = VolumeBuilder::build(vec![first, second]).unwrap();
        assert_eq!(volume.data()[[0, 0, 0]], 1.0 - 1024.0);
        assert_eq!(volume.data()[[1, 0, 0]], 2.0 - 1024.0);
    }

    #[test]
    fn inconsistent_pixel_counts_are_fatal() {
        let mut odd = record(1.0, 0);
        odd.pixels = arr2(&[[0u16, 1, 2], [3, 4, 5]]);
        let result = VolumeBuilder::build(vec![record(0.0, 0), odd]);
        assert!(matches!(result, Err(Error::InconsistentGeometry(_))));
    }

    #[test]
    fn non_positive_spacing_is_fatal() {
        let mut flat = record(0.0, 0);
        flat.thickness = 0.0;
        assert!(matches!(
            VolumeBuilder::build(vec![flat]),
            Err(Error::InconsistentGeometry(_))
        ));
        let mut inverted = record(0.0, 0);
        inverted.col_spacing = -0.7;
        assert!(matches!(
            VolumeBuilder::build(vec![inverted]),
            Err(Error::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn inconsistent_spacing_is_fatal() {
        let mut odd = record(1.0, 0);
        odd.row_spacing = 0.6;
        let result = VolumeBuilder::build(vec![record(0.0, 0), odd]);
        assert!(matches!(result, Err(Error::InconsistentGeometry(_))));
    }
}
