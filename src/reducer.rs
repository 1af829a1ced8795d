use crate::enums::Reduction;
use crate::error::{Error, Result};
use crate::mask::Mask;
use crate::volume::Volume;

/// Reduce a field restricted to the mask-true voxels.
///
/// Pure: neither field nor mask is touched. Empty-mask behavior is defined
/// per operation: `Sum` and `Count` are 0, `Mean` is explicitly 0 (not NaN,
/// so reports never carry undefined values), and `Max` is
/// [`Error::EmptyMask`] since an empty set has no maximum. Callers wanting a
/// maximum regardless of the mask use [`field_max`], which is a different
/// operation.
///
/// Accumulation happens in f64 over the f32 samples.
///
/// # Errors
///
/// [`Error::ShapeMismatch`] when field and mask shapes differ;
/// [`Error::EmptyMask`] for `Max` over an all-false mask.
pub fn reduce(field: &Volume, mask: &Mask, op: Reduction) -> Result<f64> {
    if field.dim() != mask.dim() {
        return Err(Error::ShapeMismatch(format!(
            "field is {:?}, mask is {:?}",
            field.dim(),
            mask.dim()
        )));
    }

    let mut sum = 0.0f64;
    let mut count = 0u64;
    let mut max = f64::NEG_INFINITY;
    for (&value, &selected) in field.data().iter().zip(mask.data()) {
        if !selected {
            continue;
        }
        let v = value as f64;
        sum += v;
        count += 1;
        max = max.max(v);
    }

    match op {
        Reduction::Sum => Ok(sum),
        Reduction::Count => Ok(count as f64),
        Reduction::Mean => {
            if count == 0 {
                Ok(0.0)
            } else {
                Ok(sum / count as f64)
            }
        }
        Reduction::Max => {
            if count == 0 {
                Err(Error::EmptyMask)
            } else {
                Ok(max)
            }
        }
    }
}

/// Maximum over the whole field, ignoring any mask. 0.0 for an empty field.
pub fn field_max(field: &Volume) -> f64 {
    let max = field
        .data()
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v as f64));
    if max.is_finite() { max } else { 0.0 }
}
