//! MetaImage (.mhd + .raw) interchange with the external simulation and
//! visualization ecosystem.
//!
//! The header is self-describing ASCII key-value text; the payload is a raw
//! binary sibling file. MetaImage headers record `DimSize`,
//! `ElementSpacing` and `Offset` in (x, y, z) order, while volumes are
//! stored (slice, row, col) = (z, y, x) in memory. The conversion happens
//! here, through the named `*_xyz()` accessors, and nowhere else. The
//! payload raster order is x-fastest, which is exactly the C-order layout
//! of the canonical array, so the bytes themselves are never permuted.

use crate::error::{Error, Result};
use crate::volume::Volume;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use ndarray::Array3;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Scalar type of a MetaImage payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    Float,
    Double,
    Short,
    UShort,
    UChar,
}

impl ElementType {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "MET_FLOAT" => Ok(Self::Float),
            "MET_DOUBLE" => Ok(Self::Double),
            "MET_SHORT" => Ok(Self::Short),
            "MET_USHORT" => Ok(Self::UShort),
            "MET_UCHAR" => Ok(Self::UChar),
            other => Err(Error::InvalidHeader(format!(
                "unsupported ElementType {other}"
            ))),
        }
    }

    fn byte_size(self) -> usize {
        match self {
            Self::Float => 4,
            Self::Double => 8,
            Self::Short | Self::UShort => 2,
            Self::UChar => 1,
        }
    }
}

/// Write a volume as `<path>.mhd` plus a sibling `.raw` payload.
///
/// The payload is always little-endian MET_FLOAT, and the header records
/// exactly that, so a reader never has to assume a convention.
pub fn write(volume: &Volume, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let raw_path = path.with_extension("raw");
    let raw_name = raw_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidHeader(format!("invalid output path {}", path.display())))?
        .to_string();

    let geo = volume.geometry();
    let (dx, dy, dz) = geo.dim_xyz();
    let [sx, sy, sz] = geo.spacing_xyz();
    let [ox, oy, oz] = geo.origin_xyz();

    let mut header = String::new();
    header.push_str("ObjectType = Image\n");
    header.push_str("NDims = 3\n");
    header.push_str("BinaryData = True\n");
    header.push_str("BinaryDataByteOrderMSB = False\n");
    header.push_str("CompressedData = False\n");
    header.push_str("TransformMatrix = 1 0 0 0 1 0 0 0 1\n");
    header.push_str(&format!("Offset = {ox} {oy} {oz}\n"));
    header.push_str("CenterOfRotation = 0 0 0\n");
    header.push_str(&format!("ElementSpacing = {sx} {sy} {sz}\n"));
    header.push_str(&format!("DimSize = {dx} {dy} {dz}\n"));
    header.push_str("ElementType = MET_FLOAT\n");
    header.push_str(&format!("ElementDataFile = {raw_name}\n"));
    fs::write(path, header)?;

    let file = File::create(&raw_path)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    // C-order iteration over (slice, row, col) is x-fastest, the MetaImage
    // raster order.
    for &value in volume.data() {
        writer.write_f32::<LittleEndian>(value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a MetaImage volume, honoring the byte order and scalar type the
/// header declares. Data is converted to f32 and the (x, y, z) header
/// triples to the canonical (slice, row, col) order.
pub fn read(path: impl AsRef<Path>) -> Result<Volume> {
    let path = path.as_ref();
    let header_text = fs::read_to_string(path)?;
    let header = Header::parse(&header_text)?;

    let raw_path = path
        .parent()
        .map(|dir| dir.join(&header.data_file))
        .unwrap_or_else(|| header.data_file.clone().into());
    let bytes = fs::read(&raw_path)?;

    let voxels = header.dim_xyz[0] * header.dim_xyz[1] * header.dim_xyz[2];
    let expected = voxels * header.element_type.byte_size();
    if bytes.len() < expected {
        return Err(Error::InvalidHeader(format!(
            "payload {} holds {} bytes, header expects {expected}",
            raw_path.display(),
            bytes.len()
        )));
    }

    let values = if header.big_endian {
        decode::<BigEndian>(header.element_type, &bytes[..expected])
    } else {
        decode::<LittleEndian>(header.element_type, &bytes[..expected])
    };

    // (x, y, z) header order to canonical (z, y, x).
    let [dx, dy, dz] = header.dim_xyz;
    let data = Array3::from_shape_vec((dz, dy, dx), values)
        .map_err(|e| Error::InvalidHeader(e.to_string()))?;
    let spacing = [
        header.spacing_xyz[2],
        header.spacing_xyz[1],
        header.spacing_xyz[0],
    ];
    let origin = [
        header.offset_xyz[2],
        header.offset_xyz[1],
        header.offset_xyz[0],
    ];
    Ok(Volume::with_origin(data, spacing, origin))
}

fn decode<E: ByteOrder>(ty: ElementType, bytes: &[u8]) -> Vec<f32> {
    match ty {
        ElementType::Float => bytes.chunks_exact(4).map(E::read_f32).collect(),
        ElementType::Double => bytes.chunks_exact(8).map(|c| E::read_f64(c) as f32).collect(),
        ElementType::Short => bytes.chunks_exact(2).map(|c| E::read_i16(c) as f32).collect(),
        ElementType::UShort => bytes.chunks_exact(2).map(|c| E::read_u16(c) as f32).collect(),
        ElementType::UChar => bytes.iter().map(|&b| b as f32).collect(),
    }
}

struct Header {
    dim_xyz: [usize; 3],
    spacing_xyz: [f64; 3],
    offset_xyz: [f64; 3],
    element_type: ElementType,
    big_endian: bool,
    data_file: String,
}

impl Header {
    fn parse(text: &str) -> Result<Self> {
        let mut ndims = None;
        let mut dim_xyz = None;
        let mut spacing_xyz = None;
        let mut offset_xyz = [0.0f64; 3];
        let mut element_type = None;
        let mut big_endian = false;
        let mut data_file = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "NDims" => {
                    ndims = Some(value.parse::<usize>().map_err(|_| {
                        Error::InvalidHeader(format!("NDims is not an integer: {value}"))
                    })?);
                }
                "DimSize" => dim_xyz = Some(parse_triple::<usize>(key, value)?),
                "ElementSpacing" => spacing_xyz = Some(parse_triple::<f64>(key, value)?),
                "Offset" | "Position" => offset_xyz = parse_triple::<f64>(key, value)?,
                "ElementType" => element_type = Some(ElementType::from_name(value)?),
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                    big_endian = value.eq_ignore_ascii_case("true");
                }
                "CompressedData" => {
                    if value.eq_ignore_ascii_case("true") {
                        return Err(Error::InvalidHeader(
                            "compressed payloads are not supported".into(),
                        ));
                    }
                }
                "ElementDataFile" => {
                    if value.eq_ignore_ascii_case("LOCAL") {
                        return Err(Error::InvalidHeader(
                            "inline (LOCAL) payloads are not supported".into(),
                        ));
                    }
                    data_file = Some(value.to_string());
                }
                _ => {}
            }
        }

        if ndims != Some(3) {
            return Err(Error::InvalidHeader(format!(
                "expected NDims = 3, got {ndims:?}"
            )));
        }
        let spacing_xyz =
            spacing_xyz.ok_or_else(|| Error::InvalidHeader("missing ElementSpacing".into()))?;
        if spacing_xyz.iter().any(|&s| s <= 0.0) {
            return Err(Error::InvalidHeader(format!(
                "ElementSpacing must be strictly positive, got {spacing_xyz:?}"
            )));
        }

        let dim_xyz = dim_xyz.ok_or_else(|| Error::InvalidHeader("missing DimSize".into()))?;
        if dim_xyz.iter().any(|&d| d == 0) {
            return Err(Error::InvalidHeader(format!(
                "DimSize components must be positive, got {dim_xyz:?}"
            )));
        }

        Ok(Self {
            dim_xyz,
            spacing_xyz,
            offset_xyz,
            element_type: element_type
                .ok_or_else(|| Error::InvalidHeader("missing ElementType".into()))?,
            big_endian,
            data_file: data_file
                .ok_or_else(|| Error::InvalidHeader("missing ElementDataFile".into()))?,
        })
    }
}

fn parse_triple<T: std::str::FromStr + Copy>(key: &str, value: &str) -> Result<[T; 3]> {
    let parts: Vec<T> = value
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::InvalidHeader(format!("{key} is not a numeric triple: {value}")))?;
    if parts.len() != 3 {
        return Err(Error::InvalidHeader(format!(
            "{key} needs 3 components, got {}",
            parts.len()
        )));
    }
    Ok([parts[0], parts[1], parts[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    fn sample() -> Volume {
        let data = Array3::from_shape_fn((3, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as f32 * 0.5);
        Volume::with_origin(data, [2.5, 0.9, 0.8], [-3.75, -0.9, -0.8])
    }

    #[test]
    fn round_trip_preserves_data_and_geometry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phantom.mhd");
        let vol = sample();
        write(&vol, &path).unwrap();
        let back = read(&path).unwrap();

        assert_eq!(back.dim(), vol.dim());
        assert_eq!(back.data(), vol.data());
        for axis in 0..3 {
            assert!((back.spacing()[axis] - vol.spacing()[axis]).abs() < 1e-6);
            assert!((back.origin()[axis] - vol.origin()[axis]).abs() < 1e-6);
        }
    }

    #[test]
    fn header_records_xyz_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phantom.mhd");
        write(&sample(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        // memory order is (3 slices, 2 rows, 2 cols); header is x y z
        assert!(text.contains("DimSize = 2 2 3"));
        assert!(text.contains("ElementSpacing = 0.8 0.9 2.5"));
        assert!(text.contains("ElementType = MET_FLOAT"));
    }

    #[test]
    fn short_payloads_are_read_and_widened() {
        let dir = tempdir().unwrap();
        let mhd = dir.path().join("dose.mhd");
        let raw = dir.path().join("dose.raw");
        let header = "ObjectType = Image\nNDims = 3\nBinaryData = True\n\
                      BinaryDataByteOrderMSB = False\nElementSpacing = 1 1 1\n\
                      DimSize = 2 1 1\nElementType = MET_SHORT\nElementDataFile = dose.raw\n";
        std::fs::write(&mhd, header).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(&(-5i16).to_le_bytes());
        payload.extend_from_slice(&7i16.to_le_bytes());
        std::fs::write(&raw, payload).unwrap();

        let vol = read(&mhd).unwrap();
        assert_eq!(vol.dim(), (1, 1, 2));
        assert_eq!(vol.data()[[0, 0, 0]], -5.0);
        assert_eq!(vol.data()[[0, 0, 1]], 7.0);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let dir = tempdir().unwrap();
        let mhd = dir.path().join("dose.mhd");
        let header = "NDims = 3\nElementSpacing = 1 1 1\nDimSize = 4 4 4\n\
                      ElementType = MET_FLOAT\nElementDataFile = dose.raw\n";
        std::fs::write(&mhd, header).unwrap();
        std::fs::write(dir.path().join("dose.raw"), [0u8; 16]).unwrap();
        assert!(matches!(read(&mhd), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let dir = tempdir().unwrap();
        let mhd = dir.path().join("bad.mhd");
        std::fs::write(&mhd, "NDims = 2\nDimSize = 4 4\n").unwrap();
        assert!(matches!(read(&mhd), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn zero_dim_size_is_rejected() {
        let dir = tempdir().unwrap();
        let mhd = dir.path().join("empty.mhd");
        let header = "NDims = 3\nElementSpacing = 1 1 1\nDimSize = 0 4 4\n\
                      ElementType = MET_FLOAT\nElementDataFile = empty.raw\n";
        std::fs::write(&mhd, header).unwrap();
        std::fs::write(dir.path().join("empty.raw"), [0u8; 0]).unwrap();
        assert!(matches!(read(&mhd), Err(Error::InvalidHeader(_))));
    }
}
