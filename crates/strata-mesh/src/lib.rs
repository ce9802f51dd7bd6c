#![warn(missing_docs)]

//! Indexed triangle meshes for the strata toolpath pipeline.
//!
//! Meshes arrive either from STL files ([`load_stl`]) or are built in
//! memory (tests, procedural shapes such as [`TriangleMesh::cuboid`]).
//! The slicer only needs positions and indices; normals are carried for
//! callers that want them.

mod stl;

pub use stl::{load_stl, read_stl};

use strata_math::{Point3, Transform};
use thiserror::Error;

/// Errors raised while loading or preparing meshes.
#[derive(Error, Debug)]
pub enum MeshError {
    /// I/O failure while reading a mesh file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mesh file could not be parsed.
    #[error("failed to parse mesh: {0}")]
    Parse(String),

    /// The mesh has no triangles.
    #[error("mesh has no triangles")]
    Empty,
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]` (f32).
    pub vertices: Vec<f32>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]` (u32).
    pub indices: Vec<u32>,
    /// Flat array of vertex normals: `[nx0, ny0, nz0, ...]` (f32). May be empty.
    pub normals: Vec<f32>,
}

/// Axis-aligned bounds of a mesh as `(min, max)` corners.
pub type Bounds3 = ([f64; 3], [f64; 3]);

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            normals: Vec::new(),
        }
    }

    /// Axis-aligned box spanning `min`..`max`, outward-facing CCW triangles.
    pub fn cuboid(min: [f64; 3], max: [f64; 3]) -> Self {
        let (x0, y0, z0) = (min[0] as f32, min[1] as f32, min[2] as f32);
        let (x1, y1, z1) = (max[0] as f32, max[1] as f32, max[2] as f32);
        let vertices = vec![
            x0, y0, z0, x1, y0, z0, x1, y1, z0, x0, y1, z0, //
            x0, y0, z1, x1, y0, z1, x1, y1, z1, x0, y1, z1,
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 6, 4, 6, 7, // top
            0, 1, 5, 0, 5, 4, // front
            2, 3, 7, 2, 7, 6, // back
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ];
        Self {
            vertices,
            indices,
            normals: Vec::new(),
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Is the mesh free of triangles?
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Position of vertex `i` in double precision.
    pub fn vertex(&self, i: usize) -> Point3 {
        Point3::new(
            self.vertices[i * 3] as f64,
            self.vertices[i * 3 + 1] as f64,
            self.vertices[i * 3 + 2] as f64,
        )
    }

    /// Corner positions of triangle `t`.
    pub fn triangle(&self, t: usize) -> [Point3; 3] {
        [
            self.vertex(self.indices[t * 3] as usize),
            self.vertex(self.indices[t * 3 + 1] as usize),
            self.vertex(self.indices[t * 3 + 2] as usize),
        ]
    }

    /// Merge another mesh into this one.
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.num_vertices() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + offset));
    }

    /// Compute the bounding box, `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<Bounds3> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = [f64::MAX, f64::MAX, f64::MAX];
        let mut max = [f64::MIN, f64::MIN, f64::MIN];

        for chunk in self.vertices.chunks_exact(3) {
            for axis in 0..3 {
                let v = chunk[axis] as f64;
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
            }
        }

        Some((min, max))
    }

    /// Apply an affine transform to every vertex. Normals are dropped.
    pub fn transform(&mut self, transform: &Transform) {
        for chunk in self.vertices.chunks_exact_mut(3) {
            let p = transform.apply_point(&Point3::new(
                chunk[0] as f64,
                chunk[1] as f64,
                chunk[2] as f64,
            ));
            chunk[0] = p.x as f32;
            chunk[1] = p.y as f32;
            chunk[2] = p.z as f32;
        }
        self.normals.clear();
    }

    /// Translate the mesh so that its lowest point sits on z = 0.
    pub fn place_on_bed(&mut self) {
        if let Some((min, _)) = self.bounds() {
            if min[2] != 0.0 {
                self.transform(&Transform::translation(0.0, 0.0, -min[2]));
            }
        }
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Combined bounds of several meshes.
pub fn combined_bounds<'a>(meshes: impl IntoIterator<Item = &'a TriangleMesh>) -> Option<Bounds3> {
    meshes
        .into_iter()
        .filter_map(TriangleMesh::bounds)
        .reduce(|(amin, amax), (bmin, bmax)| {
            (
                [amin[0].min(bmin[0]), amin[1].min(bmin[1]), amin[2].min(bmin[2])],
                [amax[0].max(bmax[0]), amax[1].max(bmax[1]), amax[2].max(bmax[2])],
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_bounds() {
        let mesh = TriangleMesh::cuboid([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        assert_eq!(mesh.num_triangles(), 12);
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(min[2], 0.0);
        assert_relative_eq!(max[0], 10.0);
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut a = TriangleMesh::cuboid([0.0; 3], [1.0; 3]);
        let b = TriangleMesh::cuboid([2.0, 0.0, 0.0], [3.0, 1.0, 1.0]);
        a.merge(&b);
        assert_eq!(a.num_vertices(), 16);
        assert_eq!(a.num_triangles(), 24);
        assert!(a.indices[36..].iter().all(|&i| i >= 8));
    }

    #[test]
    fn test_place_on_bed() {
        let mut mesh = TriangleMesh::cuboid([0.0, 0.0, 3.5], [1.0, 1.0, 4.5]);
        mesh.place_on_bed();
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(min[2], 0.0);
        assert_relative_eq!(max[2], 1.0);
    }

    #[test]
    fn test_combined_bounds() {
        let a = TriangleMesh::cuboid([0.0; 3], [1.0; 3]);
        let b = TriangleMesh::cuboid([-2.0, 0.0, 0.0], [0.5, 4.0, 2.0]);
        let (min, max) = combined_bounds([&a, &b]).unwrap();
        assert_relative_eq!(min[0], -2.0);
        assert_relative_eq!(max[1], 4.0);
        assert_relative_eq!(max[2], 2.0);
        assert!(combined_bounds(std::iter::empty()).is_none());
    }
}
