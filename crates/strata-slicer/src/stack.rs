//! Slicing a set of meshes into a layer stack.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use strata_math::{Point2, Tolerance};
use strata_mesh::{combined_bounds, TriangleMesh};
use tracing::{debug, info, warn};

use crate::contour::{nest_loops, NestingOptions, PlaneSection, SectionIndex};
use crate::error::{Result, SlicerError};
use crate::path::Polyline;
use crate::settings::PrintSettings;
use crate::slice::Slice;

/// What a mesh contributes to each slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshRole {
    /// Printed part.
    #[default]
    Solid,
    /// Explicit support structure.
    Support,
    /// Volume removed from the solids.
    Cavity,
    /// Open surface sliced into open paths.
    OpenPaths,
}

/// How open paths from an [`MeshRole::OpenPaths`] mesh are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenPathMode {
    /// Cut into the solids and printed in their place.
    #[default]
    Embedded,
    /// Printed only where they run outside the solids.
    Clipped,
    /// Dropped.
    Ignored,
}

/// A mesh tagged with its role in the print.
#[derive(Debug, Clone)]
pub struct PrintMesh {
    /// Geometry.
    pub mesh: TriangleMesh,
    /// Role.
    pub role: MeshRole,
    /// Treatment of open paths, used by [`MeshRole::OpenPaths`].
    pub open_mode: OpenPathMode,
}

impl PrintMesh {
    /// A printed part.
    pub fn solid(mesh: TriangleMesh) -> Self {
        Self {
            mesh,
            role: MeshRole::Solid,
            open_mode: OpenPathMode::Embedded,
        }
    }

    /// An explicit support mesh.
    pub fn support(mesh: TriangleMesh) -> Self {
        Self {
            role: MeshRole::Support,
            ..Self::solid(mesh)
        }
    }

    /// A cavity mesh.
    pub fn cavity(mesh: TriangleMesh) -> Self {
        Self {
            role: MeshRole::Cavity,
            ..Self::solid(mesh)
        }
    }

    /// An open surface printed as paths.
    pub fn open_paths(mesh: TriangleMesh, mode: OpenPathMode) -> Self {
        Self {
            mesh,
            role: MeshRole::OpenPaths,
            open_mode: mode,
        }
    }
}

/// Ordered sequence of slices, bottom to top.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    slices: Vec<Slice>,
}

impl LayerStack {
    /// Wrap prepared slices.
    pub fn new(slices: Vec<Slice>) -> Self {
        Self { slices }
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Is the stack empty?
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slice at `index`.
    pub fn get(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)
    }

    /// All slices.
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Iterate bottom to top.
    pub fn iter(&self) -> std::slice::Iter<'_, Slice> {
        self.slices.iter()
    }

    /// Resolve every slice in parallel.
    pub fn resolve_all(&mut self, path_width: Option<f64>) -> Result<()> {
        self.slices
            .par_iter_mut()
            .try_for_each(|slice| slice.resolve(path_width))
    }

    /// Are all slices resolved?
    pub fn is_resolved(&self) -> bool {
        self.slices.iter().all(Slice::is_resolved)
    }

    /// First unresolved slice, as an error.
    pub fn require_resolved(&self) -> Result<()> {
        match self.slices.iter().find(|s| !s.is_resolved()) {
            Some(slice) => Err(SlicerError::SliceNotResolved(slice.index)),
            None => Ok(()),
        }
    }
}

/// Cutting heights for a part spanning `z_min..z_max`.
///
/// The layer count is the number of whole layers in the span, rounding a
/// trailing partial layer up.
pub fn layer_heights(z_min: f64, z_max: f64, layer_height: f64, mid_height: bool) -> Vec<f64> {
    if z_max <= z_min || layer_height <= 0.0 {
        return Vec::new();
    }

    let count = ((z_max - z_min) / layer_height - 1.0e-6).ceil().max(1.0) as usize;
    let offset = if mid_height {
        layer_height / 2.0
    } else {
        layer_height
    };
    (0..count)
        .map(|i| (z_min + i as f64 * layer_height + offset).min(z_max))
        .collect()
}

/// Builds a [`LayerStack`] from meshes.
pub struct SliceStackBuilder {
    settings: PrintSettings,
    tolerance: Tolerance,
    progress: AtomicUsize,
}

struct PreparedMesh<'a> {
    source: &'a PrintMesh,
    index: SectionIndex,
    /// Centre of a support mesh too small to slice into regions.
    support_point: Option<Point2>,
}

impl SliceStackBuilder {
    /// Create a builder.
    pub fn new(settings: PrintSettings) -> Self {
        Self {
            settings,
            tolerance: Tolerance::DEFAULT,
            progress: AtomicUsize::new(0),
        }
    }

    /// Number of (layer, mesh) pairs processed so far.
    pub fn completed(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }

    /// Slice every mesh at every layer height.
    pub fn build(&self, meshes: &[PrintMesh]) -> Result<LayerStack> {
        self.settings.validate()?;
        let meshes: Vec<&PrintMesh> = meshes.iter().filter(|m| !m.mesh.is_empty()).collect();
        let (min, max) =
            combined_bounds(meshes.iter().map(|m| &m.mesh)).ok_or(SlicerError::EmptyMesh)?;

        let heights = layer_heights(
            min[2],
            max[2],
            self.settings.layer_height,
            self.settings.slice_at_mid_height,
        );
        info!(
            layers = heights.len(),
            meshes = meshes.len(),
            z_min = min[2],
            z_max = max[2],
            "slicing"
        );

        let prepared: Vec<PreparedMesh> = meshes
            .par_iter()
            .map(|m| self.prepare(m))
            .collect();

        self.progress.store(0, Ordering::Relaxed);
        let layer_height = self.settings.layer_height;
        let slices: Vec<Slice> = heights
            .par_iter()
            .enumerate()
            .map(|(i, &z)| {
                let mut slice = Slice::new(z, i, layer_height);
                for mesh in &prepared {
                    self.add_mesh(&mut slice, mesh);
                    self.progress.fetch_add(1, Ordering::Relaxed);
                }
                slice
            })
            .collect();

        Ok(LayerStack::new(slices))
    }

    fn prepare<'a>(&self, mesh: &'a PrintMesh) -> PreparedMesh<'a> {
        let support_point = match (mesh.role, mesh.mesh.bounds()) {
            (MeshRole::Support, Some((min, max)))
                if (max[0] - min[0]).max(max[1] - min[1]) < self.settings.support_point_diameter =>
            {
                Some(Point2::new((min[0] + max[0]) / 2.0, (min[1] + max[1]) / 2.0))
            }
            _ => None,
        };
        PreparedMesh {
            source: mesh,
            index: SectionIndex::new(&mesh.mesh),
            support_point,
        }
    }

    fn add_mesh(&self, slice: &mut Slice, mesh: &PreparedMesh) {
        let (z_min, z_max) = mesh.index.z_range();
        if mesh.index.is_empty() || slice.z < z_min || slice.z > z_max {
            return;
        }

        if let Some(point) = mesh.support_point {
            slice.inputs_mut().support_points.push(point);
            return;
        }

        let section = self.section_with_retry(mesh, slice.z);
        let nesting = NestingOptions {
            trust_winding: self.settings.trust_winding,
            allow_overlapping_holes: self.settings.allow_overlapping_holes,
        };
        let inputs = slice.inputs_mut();

        match mesh.source.role {
            MeshRole::Solid => inputs.solids.extend(nest_loops(section.loops, nesting)),
            MeshRole::Support => inputs.support.extend(nest_loops(section.loops, nesting)),
            MeshRole::Cavity => inputs.cavities.extend(nest_loops(section.loops, nesting)),
            MeshRole::OpenPaths => {
                let paths = section.open.into_iter().chain(section.loops.into_iter().map(|l| {
                    let mut points = l.points;
                    if let Some(&first) = points.first() {
                        points.push(first);
                    }
                    Polyline::new(points)
                }));
                match mesh.source.open_mode {
                    OpenPathMode::Embedded => inputs.embedded_paths.extend(paths),
                    OpenPathMode::Clipped => inputs.clipped_paths.extend(paths),
                    OpenPathMode::Ignored => {}
                }
            }
        }
    }

    /// Cut at `z`, retrying once slightly lower when the plane lands
    /// exactly on geometry and produces nothing.
    ///
    /// Each cut stands for the slab below or around it, so the retry moves
    /// into that slab. A plane on a mesh's base face leaves the mesh to the
    /// layer above.
    fn section_with_retry(&self, mesh: &PreparedMesh, z: f64) -> PlaneSection {
        let section = mesh.index.section(z);
        if !section.is_empty() {
            return section;
        }
        let jittered = z - self.tolerance.z_jitter;
        if jittered < mesh.index.z_range().0 {
            debug!(z, "plane on mesh base, nothing to cut");
            return section;
        }
        debug!(z, jittered, "empty section, retrying");
        let section = mesh.index.section(jittered);
        if section.is_empty() {
            warn!(z, "mesh spans the plane but produced no section");
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip;

    #[test]
    fn test_layer_heights() {
        let heights = layer_heights(0.0, 1.0, 0.2, true);
        assert_eq!(heights.len(), 5);
        assert!((heights[0] - 0.1).abs() < 1e-12);
        assert!((heights[4] - 0.9).abs() < 1e-12);

        let heights = layer_heights(0.0, 1.1, 0.2, false);
        assert_eq!(heights.len(), 6);
        assert!((heights[5] - 1.1).abs() < 1e-12);

        assert!(layer_heights(1.0, 1.0, 0.2, true).is_empty());
    }

    #[test]
    fn test_unit_cube_stack() {
        let builder = SliceStackBuilder::new(PrintSettings::default());
        let cube = PrintMesh::solid(TriangleMesh::cuboid([0.0; 3], [1.0; 3]));
        let mut stack = builder.build(&[cube]).unwrap();
        assert_eq!(stack.len(), 5);
        assert_eq!(builder.completed(), 5);

        stack.resolve_all(None).unwrap();
        for slice in stack.iter() {
            assert_eq!(slice.solids().len(), 1);
            assert!((slice.solids()[0].area() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_plane_on_base_face_leaves_mesh_to_layer_above() {
        let settings = PrintSettings {
            slice_at_mid_height: false,
            layer_height: 0.25,
            ..Default::default()
        };
        let builder = SliceStackBuilder::new(settings);
        let meshes = [
            PrintMesh::solid(TriangleMesh::cuboid([0.0; 3], [10.0, 10.0, 1.0])),
            PrintMesh::solid(TriangleMesh::cuboid([20.0, 0.0, 0.5], [25.0, 5.0, 1.0])),
        ];

        let step = builder.prepare(&meshes[1]);
        assert!(step.index.section(0.5).is_empty());
        assert!(builder.section_with_retry(&step, 0.5).is_empty());
        let above = builder.section_with_retry(&step, 0.75);
        assert_eq!(above.loops.len(), 1);
        assert!((above.loops[0].area() - 25.0).abs() < 1e-6);

        let stack = builder.build(&meshes).unwrap();
        let counts: Vec<usize> = stack.iter().map(|s| s.inputs().solids.len()).collect();
        assert_eq!(counts, vec![1, 1, 2, 2]);
        let top = &stack.get(2).unwrap().inputs().solids;
        assert!(top.iter().any(|r| (r.area() - 25.0).abs() < 1e-6));
    }

    #[test]
    fn test_empty_input() {
        let builder = SliceStackBuilder::new(PrintSettings::default());
        let err = builder.build(&[PrintMesh::solid(TriangleMesh::new())]).unwrap_err();
        assert_eq!(err, SlicerError::EmptyMesh);
    }

    #[test]
    fn test_roles_route_to_inputs() {
        let builder = SliceStackBuilder::new(PrintSettings::default());
        let meshes = [
            PrintMesh::solid(TriangleMesh::cuboid([0.0; 3], [10.0, 10.0, 2.0])),
            PrintMesh::cavity(TriangleMesh::cuboid([4.0, 4.0, 0.0], [6.0, 6.0, 2.0])),
            PrintMesh::support(TriangleMesh::cuboid([20.0, 0.0, 0.0], [0.5 + 20.0, 0.5, 2.0])),
        ];
        let mut stack = builder.build(&meshes).unwrap();
        let first = stack.get(0).unwrap();
        assert_eq!(first.inputs().solids.len(), 1);
        assert_eq!(first.inputs().cavities.len(), 1);
        // The support mesh is narrower than a support dot.
        assert_eq!(first.support_points().len(), 1);

        stack.resolve_all(None).unwrap();
        let first = stack.get(0).unwrap();
        assert!((clip::total_area(first.solids()) - 96.0).abs() < 1e-3);
        assert!(stack.is_resolved());
    }
}
