use crate::error::{Error, Result};
use crate::volume::Volume;

use ndarray::{Array3, Zip};

/// Boolean voxel mask, same shape and axis order as its source volume.
#[derive(Clone, Debug)]
pub struct Mask {
    data: Array3<bool>,
}

impl Mask {
    pub fn data(&self) -> &Array3<bool> {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of selected voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// Zero-filled masked product: selected voxels keep the field value,
    /// everything else becomes 0.0. The result is a new volume on the
    /// field's grid.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] when mask and field shapes differ.
    pub fn apply(&self, field: &Volume) -> Result<Volume> {
        if self.dim() != field.dim() {
            return Err(Error::ShapeMismatch(format!(
                "mask is {:?}, field is {:?}",
                self.dim(),
                field.dim()
            )));
        }
        let mut data = Array3::<f32>::zeros(field.dim());
        Zip::from(&mut data)
            .and(field.data())
            .and(&self.data)
            .par_for_each(|out, &v, &m| *out = if m { v } else { 0.0 });
        Ok(Volume::with_origin(data, field.spacing(), field.origin()))
    }
}

/// Mask of voxels with `intensity >= cutoff`.
pub fn threshold(volume: &Volume, cutoff: f32) -> Mask {
    let mut data = Array3::from_elem(volume.dim(), false);
    Zip::from(&mut data)
        .and(volume.data())
        .par_for_each(|out, &v| *out = v >= cutoff);
    Mask { data }
}

/// Mask of voxels with `low <= intensity <= high`.
pub fn band(volume: &Volume, low: f32, high: f32) -> Mask {
    let mut data = Array3::from_elem(volume.dim(), false);
    Zip::from(&mut data)
        .and(volume.data())
        .par_for_each(|out, &v| *out = v >= low && v <= high);
    Mask { data }
}

/// One `[low, high)` intensity interval mapped to a material name.
#[derive(Clone, Debug)]
pub struct MaterialBin {
    pub low: f32,
    pub high: f32,
    pub label: String,
}

/// Ordered intensity-to-material lookup table.
///
/// Bins are validated on construction: ascending, contiguous (each bin
/// starts where the previous one ends) and non-empty, so label assignment
/// is a total function over `[first.low, last.high]`.
#[derive(Clone, Debug)]
pub struct MaterialTable {
    bins: Vec<MaterialBin>,
}

impl MaterialTable {
    pub fn new(bins: impl IntoIterator<Item = (f32, f32, impl Into<String>)>) -> Result<Self> {
        let bins: Vec<MaterialBin> = bins
            .into_iter()
            .map(|(low, high, label)| MaterialBin {
                low,
                high,
                label: label.into(),
            })
            .collect();

        if bins.is_empty() {
            return Err(Error::InvalidMaterialTable("table has no bins".into()));
        }
        if bins.len() > u8::MAX as usize {
            return Err(Error::InvalidMaterialTable(format!(
                "{} bins exceed the label range",
                bins.len()
            )));
        }
        for (i, bin) in bins.iter().enumerate() {
            if !(bin.low < bin.high) {
                return Err(Error::InvalidMaterialTable(format!(
                    "bin {i} ({}) has empty interval [{}, {})",
                    bin.label, bin.low, bin.high
                )));
            }
            if i > 0 && bins[i - 1].high != bin.low {
                return Err(Error::InvalidMaterialTable(format!(
                    "gap or overlap between bin {} (ends {}) and bin {i} (starts {})",
                    i - 1,
                    bins[i - 1].high,
                    bin.low
                )));
            }
        }
        Ok(Self { bins })
    }

    pub fn bins(&self) -> &[MaterialBin] {
        &self.bins
    }

    /// Index of the first bin containing the intensity. Intervals are
    /// half-open `[low, high)`; the last bin is closed so the table's upper
    /// edge belongs to it.
    pub fn label_of(&self, intensity: f32) -> Option<u8> {
        if let Some(i) = self
            .bins
            .iter()
            .position(|bin| intensity >= bin.low && intensity < bin.high)
        {
            return Some(i as u8);
        }
        let last = self.bins.len() - 1;
        (intensity == self.bins[last].high).then_some(last as u8)
    }

    /// Total intensity span covered by the table.
    pub fn range(&self) -> (f32, f32) {
        (self.bins[0].low, self.bins[self.bins.len() - 1].high)
    }
}

/// Material labels per voxel, same shape and axis order as the source.
#[derive(Clone, Debug)]
pub struct LabelField {
    data: Array3<u8>,
    labels: Vec<String>,
}

impl LabelField {
    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_name(&self, index: u8) -> Option<&str> {
        self.labels.get(index as usize).map(String::as_str)
    }
}

/// Assign every voxel the label of the interval containing its intensity.
///
/// Coverage is validated eagerly against the volume's observed value range,
/// so a table gap fails before any field is produced rather than mid-scan.
///
/// # Errors
///
/// [`Error::UncoveredIntensity`] with the first out-of-range value.
pub fn classify(volume: &Volume, table: &MaterialTable) -> Result<LabelField> {
    let (min, max) = volume.value_range();
    let (low, high) = table.range();
    if min < low {
        return Err(Error::UncoveredIntensity(min));
    }
    if max > high {
        return Err(Error::UncoveredIntensity(max));
    }

    let labels: Result<Vec<u8>> = volume
        .data()
        .iter()
        .map(|&v| table.label_of(v).ok_or(Error::UncoveredIntensity(v)))
        .collect();
    let data = Array3::from_shape_vec(volume.dim(), labels?)
        .map_err(|e| Error::ShapeMismatch(e.to_string()))?;

    Ok(LabelField {
        data,
        labels: table.bins.iter().map(|b| b.label.clone()).collect(),
    })
}
