//! Surface-mesh boundary.
//!
//! Isosurface extraction itself (Marching Cubes) is an external
//! collaborator; this module defines the mesh contract the crate hands it
//! and interprets back, the dose overlay onto mesh vertices, and a binary
//! STL export for external viewers.

use crate::aligner;
use crate::error::{Error, Result};
use crate::volume::Volume;

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Triangle mesh produced by an isosurface extractor.
///
/// Vertex and normal components are in physical mm and in the canonical
/// (slice, row, col) order, relative to the source volume's origin. XYZ
/// consumers go through [`SurfaceMesh::vertices_xyz`].
#[derive(Clone, Debug, Default)]
pub struct SurfaceMesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub normals: Vec<[f32; 3]>,
}

impl SurfaceMesh {
    /// Vertices with components reordered to the external (x, y, z)
    /// convention.
    pub fn vertices_xyz(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| [v[2], v[1], v[0]]).collect()
    }
}

/// Isosurface extraction seam. Implementations wrap an external
/// Marching-Cubes style algorithm; the crate only guarantees the input grid
/// is correctly scaled and ordered and interprets the output per the
/// [`SurfaceMesh`] contract.
pub trait SurfaceExtractor {
    fn extract(&self, volume: &Volume, level: f32) -> Result<SurfaceMesh>;
}

/// Map a scalar field onto mesh vertices.
///
/// `field` must already be aligned to the grid the mesh was extracted from
/// (see [`crate::aligner::align`]). Vertices with no field sample within
/// `radius` mm get `None`, which callers must keep distinct from a true
/// zero value.
pub fn overlay_field(mesh: &SurfaceMesh, field: &Volume, radius: f64) -> Vec<Option<f32>> {
    let origin = field.origin();
    mesh.vertices
        .iter()
        .map(|v| {
            let point = [
                origin[0] + v[0] as f64,
                origin[1] + v[1] as f64,
                origin[2] + v[2] as f64,
            ];
            aligner::sample_near(field, point, radius)
        })
        .collect()
}

/// Write the mesh as binary STL (80-byte header, triangle count, then one
/// 50-byte record per face), with vertices in the (x, y, z) order STL
/// viewers expect.
pub fn write_stl(mesh: &SurfaceMesh, path: impl AsRef<Path>) -> Result<()> {
    for face in &mesh.faces {
        if face.iter().any(|&i| i as usize >= mesh.vertices.len()) {
            return Err(Error::ShapeMismatch(format!(
                "face {face:?} references a vertex beyond {}",
                mesh.vertices.len()
            )));
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&[0u8; 80])?;
    writer.write_u32::<LittleEndian>(mesh.faces.len() as u32)?;

    let vertices = mesh.vertices_xyz();
    for face in &mesh.faces {
        let [a, b, c] = [
            vertices[face[0] as usize],
            vertices[face[1] as usize],
            vertices[face[2] as usize],
        ];
        let normal = face_normal(a, b, c);
        for component in normal {
            writer.write_f32::<LittleEndian>(component)?;
        }
        for vertex in [a, b, c] {
            for component in vertex {
                writer.write_f32::<LittleEndian>(component)?;
            }
        }
        writer.write_u16::<LittleEndian>(0)?;
    }
    writer.flush()?;
    Ok(())
}

fn face_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len == 0.0 {
        [0.0, 0.0, 0.0]
    } else {
        [n[0] / len, n[1] / len, n[2] / len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    fn triangle() -> SurfaceMesh {
        SurfaceMesh {
            vertices: vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            faces: vec![[0, 1, 2]],
            normals: vec![[1.0, 0.0, 0.0]; 3],
        }
    }

    #[test]
    fn vertices_xyz_swaps_slice_and_col() {
        let mesh = SurfaceMesh {
            vertices: vec![[1.0, 2.0, 3.0]],
            ..Default::default()
        };
        assert_eq!(mesh.vertices_xyz(), vec![[3.0, 2.0, 1.0]]);
    }

    #[test]
    fn overlay_samples_each_vertex() {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as f32);
        let field = Volume::new(data, [1.0, 1.0, 1.0]);
        let overlay = overlay_field(&triangle(), &field, 0.25);
        assert_eq!(overlay, vec![Some(0.0), Some(2.0), Some(1.0)]);
    }

    #[test]
    fn overlay_reports_no_data_outside_radius() {
        let data = Array3::zeros((2, 2, 2));
        let field = Volume::new(data, [1.0, 1.0, 1.0]);
        let mesh = SurfaceMesh {
            vertices: vec![[50.0, 50.0, 50.0]],
            ..Default::default()
        };
        let overlay = overlay_field(&mesh, &field, 0.5);
        assert_eq!(overlay, vec![None]);
    }

    #[test]
    fn stl_file_has_the_expected_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bone.stl");
        write_stl(&triangle(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 80 + 4 + 50);
        assert_eq!(u32::from_le_bytes(bytes[80..84].try_into().unwrap()), 1);
    }

    #[test]
    fn stl_rejects_dangling_face_indices() {
        let mut mesh = triangle();
        mesh.faces[0] = [0, 1, 9];
        let dir = tempdir().unwrap();
        let result = write_stl(&mesh, dir.path().join("bad.stl"));
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
