//! Boundary to the external particle-transport scoring service.
//!
//! The engine is an out-of-process batch job: this module writes the
//! material-labeled phantom and source description it consumes, knows where
//! the resulting dose field is expected to appear, and reads it back with
//! the grid verified against the phantom. The dose is never substituted
//! with a zero field when absent.

use crate::aligner;
use crate::enums::AlignMode;
use crate::error::{Error, Result};
use crate::mask::MaterialTable;
use crate::meta_image;
use crate::volume::{Geometry, Volume};

use std::fs;
use std::path::{Path, PathBuf};

const PHANTOM_FILE: &str = "phantom_hu.mhd";
const MATERIALS_FILE: &str = "materials.txt";
const DOSE_FILE: &str = "total_dose.mhd";

/// Radiation source description, physical coordinates in mm (x, y, z).
#[derive(Clone, Debug)]
pub struct SourceSpec {
    pub particle: String,
    pub count: u64,
    pub energy_kev: f64,
    pub position_mm: [f64; 3],
    pub size_mm: [f64; 3],
}

impl Default for SourceSpec {
    /// Isotropic mono-energetic gamma box source at the world center.
    fn default() -> Self {
        Self {
            particle: "gamma".into(),
            count: 1_000_000,
            energy_kev: 364.0,
            position_mm: [0.0; 3],
            size_mm: [10.0, 10.0, 10.0],
        }
    }
}

/// One prepared hand-off to the scoring engine.
pub struct ScoringJob {
    output_dir: PathBuf,
    phantom_geometry: Geometry,
    materials: MaterialTable,
    source: SourceSpec,
}

impl ScoringJob {
    /// Write the phantom and material table into `output_dir` and record the
    /// expected artifact locations.
    ///
    /// The phantom is written on its own grid; the engine is configured to
    /// score the dose on exactly that grid, which [`Self::load_dose`]
    /// verifies on read-back. The material table must cover the phantom's
    /// intensity range.
    ///
    /// # Errors
    ///
    /// [`Error::UncoveredIntensity`] when the table does not span the
    /// phantom's values; IO errors from writing the hand-off files.
    pub fn new(
        output_dir: impl AsRef<Path>,
        phantom: &Volume,
        materials: MaterialTable,
        source: SourceSpec,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;

        let (min, max) = phantom.value_range();
        let (low, high) = materials.range();
        if min < low {
            return Err(Error::UncoveredIntensity(min));
        }
        if max > high {
            return Err(Error::UncoveredIntensity(max));
        }

        meta_image::write(phantom, output_dir.join(PHANTOM_FILE))?;

        let mut table_text = String::new();
        for bin in materials.bins() {
            table_text.push_str(&format!("{} {} {}\n", bin.low, bin.high, bin.label));
        }
        fs::write(output_dir.join(MATERIALS_FILE), table_text)?;

        Ok(Self {
            output_dir,
            phantom_geometry: phantom.geometry(),
            materials,
            source,
        })
    }

    pub fn phantom_path(&self) -> PathBuf {
        self.output_dir.join(PHANTOM_FILE)
    }

    /// Where the engine deposits the scored dose field.
    pub fn dose_path(&self) -> PathBuf {
        self.output_dir.join(DOSE_FILE)
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn source(&self) -> &SourceSpec {
        &self.source
    }

    /// Read the dose field back from the scoring run.
    ///
    /// # Errors
    ///
    /// [`Error::MissingExternalArtifact`] when the artifact does not exist
    /// yet; [`Error::GridMismatch`] when the engine scored on a different
    /// grid than the phantom it was given.
    pub fn load_dose(&self) -> Result<Volume> {
        let path = self.dose_path();
        if !path.exists() {
            return Err(Error::MissingExternalArtifact(path));
        }
        let dose = meta_image::read(&path)?;
        aligner::align(&dose, &self.phantom_geometry, AlignMode::ExactGrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    fn phantom() -> Volume {
        let data = Array3::from_elem((2, 2, 2), 0.0f32);
        Volume::centered(data, [1.0, 1.0, 1.0])
    }

    fn table() -> MaterialTable {
        MaterialTable::new([(-1024.0, 3000.0, "G4_WATER")]).unwrap()
    }

    #[test]
    fn job_writes_the_hand_off_files() {
        let dir = tempdir().unwrap();
        let job = ScoringJob::new(dir.path(), &phantom(), table(), SourceSpec::default()).unwrap();
        assert!(job.phantom_path().exists());
        assert!(dir.path().join(MATERIALS_FILE).exists());
        let text = std::fs::read_to_string(dir.path().join(MATERIALS_FILE)).unwrap();
        assert!(text.contains("G4_WATER"));
    }

    #[test]
    fn uncovered_phantom_values_are_rejected() {
        let dir = tempdir().unwrap();
        let hot = Volume::new(Array3::from_elem((1, 1, 1), 5000.0f32), [1.0, 1.0, 1.0]);
        let result = ScoringJob::new(dir.path(), &hot, table(), SourceSpec::default());
        assert!(matches!(result, Err(Error::UncoveredIntensity(_))));
    }

    #[test]
    fn missing_dose_is_a_missing_artifact() {
        let dir = tempdir().unwrap();
        let job = ScoringJob::new(dir.path(), &phantom(), table(), SourceSpec::default()).unwrap();
        assert!(matches!(
            job.load_dose(),
            Err(Error::MissingExternalArtifact(_))
        ));
    }

    #[test]
    fn dose_on_the_phantom_grid_loads() {
        let dir = tempdir().unwrap();
        let phantom = phantom();
        let job = ScoringJob::new(dir.path(), &phantom, table(), SourceSpec::default()).unwrap();
        let dose = Volume::with_origin(
            Array3::from_elem((2, 2, 2), 1.5f32),
            phantom.spacing(),
            phantom.origin(),
        );
        meta_image::write(&dose, job.dose_path()).unwrap();
        let loaded = job.load_dose().unwrap();
        assert_eq!(loaded.data()[[0, 0, 0]], 1.5);
    }

    #[test]
    fn dose_on_a_different_grid_is_a_mismatch() {
        let dir = tempdir().unwrap();
        let job = ScoringJob::new(dir.path(), &phantom(), table(), SourceSpec::default()).unwrap();
        let other = Volume::new(Array3::from_elem((3, 2, 2), 1.0f32), [1.0, 1.0, 1.0]);
        meta_image::write(&other, job.dose_path()).unwrap();
        assert!(matches!(job.load_dose(), Err(Error::GridMismatch(_))));
    }
}
