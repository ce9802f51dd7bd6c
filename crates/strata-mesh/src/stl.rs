//! STL import.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::{MeshError, Result, TriangleMesh};

/// Load an STL file (ASCII or binary) into an indexed mesh.
pub fn load_stl(path: impl AsRef<Path>) -> Result<TriangleMesh> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    read_stl(&mut reader)
}

/// Read an STL stream into an indexed mesh.
///
/// `stl_io` already welds bit-identical vertices, so the index buffer is
/// shared between adjacent faces, which the slicer's edge graph relies on.
pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<TriangleMesh> {
    let stl = stl_io::read_stl(reader).map_err(|e| MeshError::Parse(e.to_string()))?;
    if stl.faces.is_empty() {
        return Err(MeshError::Empty);
    }

    let mut mesh = TriangleMesh::new();
    mesh.vertices.reserve(stl.vertices.len() * 3);
    for v in &stl.vertices {
        mesh.vertices.extend_from_slice(&[v[0], v[1], v[2]]);
    }

    mesh.indices.reserve(stl.faces.len() * 3);
    for face in &stl.faces {
        for &i in &face.vertices {
            mesh.indices.push(i as u32);
        }
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn unit_tetrahedron() -> Vec<stl_io::Triangle> {
        let p = [
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]]
            .iter()
            .map(|f| stl_io::Triangle {
                normal: stl_io::Normal::new([0.0, 0.0, 0.0]),
                vertices: [
                    stl_io::Vertex::new(p[f[0]]),
                    stl_io::Vertex::new(p[f[1]]),
                    stl_io::Vertex::new(p[f[2]]),
                ],
            })
            .collect()
    }

    #[test]
    fn test_read_binary_stl_welds_vertices() {
        let mut buf = Cursor::new(Vec::new());
        stl_io::write_stl(&mut buf, unit_tetrahedron().iter()).unwrap();
        buf.set_position(0);

        let mesh = read_stl(&mut buf).unwrap();
        assert_eq!(mesh.num_triangles(), 4);
        assert_eq!(mesh.num_vertices(), 4);
    }

    #[test]
    fn test_load_stl_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut buf = Cursor::new(Vec::new());
        stl_io::write_stl(&mut buf, unit_tetrahedron().iter()).unwrap();
        file.write_all(buf.get_ref()).unwrap();

        let mesh = load_stl(file.path()).unwrap();
        let (_, max) = mesh.bounds().unwrap();
        assert!((max[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_stl("/nonexistent/strata/model.stl").unwrap_err();
        assert!(matches!(err, MeshError::Io(_)));
    }
}
