//! # dose-volume library
//!
//! This crate serves a high-level API for CT-based dosimetric analysis:
//! reconstructing a Hounsfield-Unit volume from a DICOM slice set, deriving
//! intensity masks and material labels from it, handing the labeled phantom
//! to an external particle-transport scoring engine, and reducing the scored
//! dose field over the masks into summary statistics.
//!
//! The crate is part of the dicom-rs ecosystem and leverages its components
//! for decoding; volumes live in [`ndarray`] arrays in the canonical
//! (slice, row, col) axis order with physical spacing in mm. Axial, coronal
//! and sagittal cross-sections can be rendered to images, and volumes round-
//! trip through the MetaImage (`.mhd`/`.raw`) format the scoring engine
//! speaks.
//!
//! Voxel-wise combinations of independently produced fields always pass
//! through [`aligner::align`] first, so a silent grid mismatch can never
//! corrupt a statistic.
//!
//! # Examples
//!
//! ## Bone-dose statistics for a scored CT series
//!
//! Reconstruct the volume from the dicom/ directory, mask bone at 200 HU,
//! read the dose field the scoring engine wrote, and reduce it over the
//! mask.
//!
//! ```no_run
//! # use dose_volume::{builder::VolumeBuilder, enums::{AlignMode, Reduction}};
//! # use dose_volume::{aligner, mask, meta_image, reducer};
//! let slices = VolumeBuilder::from_directory("dicom")
//!     .expect("should have read slices from directory");
//! let ct = VolumeBuilder::build(slices).expect("should have built the volume");
//! let bone = mask::threshold(&ct, 200.0);
//!
//! let dose = meta_image::read("output/total_dose.mhd")
//!     .expect("should have read the scored dose field");
//! let dose = aligner::align(&dose, &ct.geometry(), AlignMode::ExactGrid)
//!     .expect("dose should be scored on the CT grid");
//!
//! let total = reducer::reduce(&dose, &bone, Reduction::Sum)
//!     .expect("should have reduced over the mask");
//! println!("dose to bone: {total:.5e} Gy");
//! ```

pub mod aligner;
pub mod builder;
pub mod enums;
pub mod error;
pub mod mask;
pub mod meta_image;
pub mod reducer;
pub mod scoring;
pub mod surface;
pub mod volume;
