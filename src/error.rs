use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the reconstruction and analysis pipeline.
///
/// Every variant represents a condition that would corrupt a physical
/// quantity downstream, so none of them is recoverable by substituting a
/// default value. Callers either handle the variant explicitly or let it
/// propagate to the top level.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no DICOM slice files found in {0}")]
    NoInputFiles(PathBuf),

    #[error("slice set is empty")]
    EmptyInput,

    #[error("inconsistent slice geometry: {0}")]
    InconsistentGeometry(String),

    #[error("slice is missing required metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("intensity {0} is not covered by the material table")]
    UncoveredIntensity(f32),

    #[error("invalid material table: {0}")]
    InvalidMaterialTable(String),

    #[error("grids cannot be reconciled: {0}")]
    GridMismatch(String),

    #[error("reduction requires a non-empty mask")]
    EmptyMask,

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("expected simulation output {0} is missing; re-run the scoring step first")]
    MissingExternalArtifact(PathBuf),

    #[error("invalid MetaImage header: {0}")]
    InvalidHeader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

pub type Result<T> = std::result::Result<T, Error>;
