//! A single layer of the stack and its one-shot resolution.

use strata_math::Point2;
use tracing::debug;

use crate::clip::{self, MIN_AREA};
use crate::error::{Result, SlicerError};
use crate::path::Polyline;
use crate::region::Region;

/// Raw geometry collected from every mesh at one height.
#[derive(Debug, Clone, Default)]
pub struct SliceInputs {
    /// Solid regions, possibly overlapping.
    pub solids: Vec<Region>,
    /// Regions carved out of the solids.
    pub cavities: Vec<Region>,
    /// Regions contributed by explicit support meshes.
    pub support: Vec<Region>,
    /// Open paths embedded into the solids.
    pub embedded_paths: Vec<Polyline>,
    /// Open paths printed only where they leave the solids.
    pub clipped_paths: Vec<Polyline>,
    /// Point-like support requests.
    pub support_points: Vec<Point2>,
}

impl SliceInputs {
    /// Does the slice have no input geometry at all?
    pub fn is_empty(&self) -> bool {
        self.solids.is_empty()
            && self.cavities.is_empty()
            && self.support.is_empty()
            && self.embedded_paths.is_empty()
            && self.clipped_paths.is_empty()
            && self.support_points.is_empty()
    }
}

/// Final, non-overlapping geometry of a slice.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGeometry {
    /// Disjoint solid regions.
    pub solids: Vec<Region>,
    /// Open paths to print.
    pub paths: Vec<Polyline>,
    /// Explicit support regions clear of the solids.
    pub support_solids: Vec<Region>,
}

/// One horizontal layer.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Cutting height (mm).
    pub z: f64,
    /// Position in the stack, 0 at the bottom.
    pub index: usize,
    /// Layer thickness (mm).
    pub height: f64,
    inputs: SliceInputs,
    resolved: Option<ResolvedGeometry>,
}

impl Slice {
    /// Create an empty slice.
    pub fn new(z: f64, index: usize, height: f64) -> Self {
        Self {
            z,
            index,
            height,
            inputs: SliceInputs::default(),
            resolved: None,
        }
    }

    /// Raw inputs collected so far.
    pub fn inputs(&self) -> &SliceInputs {
        &self.inputs
    }

    /// Mutable access to the raw inputs.
    pub fn inputs_mut(&mut self) -> &mut SliceInputs {
        &mut self.inputs
    }

    /// Has [`Slice::resolve`] already run?
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolved geometry, `None` before resolution.
    pub fn resolved(&self) -> Option<&ResolvedGeometry> {
        self.resolved.as_ref()
    }

    /// Resolved geometry or an error naming this slice.
    pub fn require_resolved(&self) -> Result<&ResolvedGeometry> {
        self.resolved
            .as_ref()
            .ok_or(SlicerError::SliceNotResolved(self.index))
    }

    /// Resolved solid regions (empty before resolution).
    pub fn solids(&self) -> &[Region] {
        self.resolved.as_ref().map_or(&[], |r| &r.solids)
    }

    /// Resolved open paths (empty before resolution).
    pub fn paths(&self) -> &[Polyline] {
        self.resolved.as_ref().map_or(&[], |r| &r.paths)
    }

    /// Resolved explicit support regions (empty before resolution).
    pub fn support_solids(&self) -> &[Region] {
        self.resolved.as_ref().map_or(&[], |r| &r.support_solids)
    }

    /// Requested support points.
    pub fn support_points(&self) -> &[Point2] {
        &self.inputs.support_points
    }

    /// Turn the raw inputs into disjoint printable geometry.
    ///
    /// Solids are processed largest first. A solid with several holes has
    /// each hole subtracted on its own before it joins the accumulated union,
    /// which gives non-zero fill semantics for overlapping inputs. Cavities
    /// are then removed, embedded paths are thickened to `path_width` and cut
    /// out of the solids, and clipped paths keep only their parts outside the
    /// final solids. Support regions end up clear of both solids and
    /// thickened paths.
    ///
    /// Runs once per slice.
    pub fn resolve(&mut self, path_width: Option<f64>) -> Result<()> {
        if self.resolved.is_some() {
            return Err(SlicerError::SliceAlreadyResolved(self.index));
        }
        let inputs = &self.inputs;
        let width = match (inputs.embedded_paths.is_empty(), path_width) {
            (true, w) => w,
            (false, Some(w)) => Some(w),
            (false, None) => return Err(SlicerError::MissingPathWidth(self.z)),
        };

        let mut ordered: Vec<&Region> = inputs.solids.iter().collect();
        ordered.sort_by(|a, b| b.area().total_cmp(&a.area()));

        let mut solids: Vec<Region> = Vec::new();
        for region in ordered {
            let pieces = if region.holes.len() > 1 {
                region.holes.iter().fold(
                    vec![Region::simple(region.outer.clone())],
                    |acc, hole| clip::difference(&acc, &[Region::simple(hole.clone())]),
                )
            } else {
                vec![region.clone()]
            };
            solids = clip::union(&solids, &pieces);
        }

        if !inputs.cavities.is_empty() {
            solids = clip::difference(&solids, &inputs.cavities);
        }

        let mut paths = Vec::new();
        let mut thickened = Vec::new();
        if let (false, Some(width)) = (inputs.embedded_paths.is_empty(), width) {
            thickened = clip::thicken_polylines(&inputs.embedded_paths, width);
            solids = clip::difference(&solids, &thickened);
            paths.extend(inputs.embedded_paths.iter().cloned());
        }

        let solids = clip::remove_small(solids, MIN_AREA);

        if !inputs.clipped_paths.is_empty() {
            paths.extend(clip::clip_polylines(&inputs.clipped_paths, &solids, false));
        }

        let mut support_solids = Vec::new();
        if !inputs.support.is_empty() {
            let support = clip::union_all(&inputs.support);
            let support = clip::difference(&support, &solids);
            let support = if thickened.is_empty() {
                support
            } else {
                clip::difference(&support, &thickened)
            };
            support_solids = clip::remove_small(support, MIN_AREA);
        }

        debug!(
            index = self.index,
            z = self.z,
            solids = solids.len(),
            paths = paths.len(),
            support = support_solids.len(),
            "resolved slice"
        );

        self.resolved = Some(ResolvedGeometry {
            solids,
            paths,
            support_solids,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Polygon;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::simple(Polygon::rectangle(Point2::new(x0, y0), Point2::new(x1, y1)))
    }

    #[test]
    fn test_overlapping_solids_merge() {
        let mut slice = Slice::new(0.1, 0, 0.2);
        slice.inputs_mut().solids = vec![rect(0.0, 0.0, 10.0, 10.0), rect(5.0, 5.0, 15.0, 15.0)];
        slice.resolve(None).unwrap();

        assert_eq!(slice.solids().len(), 1);
        assert!((clip::total_area(slice.solids()) - 175.0).abs() < 1e-3);
        for region in slice.solids() {
            for hole in &region.holes {
                assert!(region.outer.contains(&hole.points[0]));
            }
        }
    }

    #[test]
    fn test_resolve_is_one_shot() {
        let mut slice = Slice::new(0.1, 3, 0.2);
        slice.inputs_mut().solids.push(rect(0.0, 0.0, 1.0, 1.0));
        slice.resolve(None).unwrap();
        assert_eq!(slice.resolve(None), Err(SlicerError::SliceAlreadyResolved(3)));
    }

    #[test]
    fn test_embedded_paths_need_width() {
        let mut slice = Slice::new(0.5, 0, 0.2);
        slice.inputs_mut().solids.push(rect(0.0, 0.0, 10.0, 10.0));
        slice
            .inputs_mut()
            .embedded_paths
            .push(Polyline::new(vec![Point2::new(2.0, 5.0), Point2::new(8.0, 5.0)]));
        assert_eq!(slice.resolve(None), Err(SlicerError::MissingPathWidth(0.5)));
        assert!(!slice.is_resolved());

        slice.resolve(Some(0.4)).unwrap();
        assert_eq!(slice.paths().len(), 1);
        // The thickened path is carved out of the solid.
        assert!(clip::total_area(slice.solids()) < 100.0 - 6.0 * 0.4 + 0.1);
        assert!(!slice.solids().iter().any(|r| r.contains(&Point2::new(5.0, 5.0))));
    }

    #[test]
    fn test_cavities_and_support() {
        let mut slice = Slice::new(0.1, 0, 0.2);
        let inputs = slice.inputs_mut();
        inputs.solids.push(rect(0.0, 0.0, 10.0, 10.0));
        inputs.cavities.push(rect(4.0, 4.0, 6.0, 6.0));
        inputs.support.push(rect(8.0, 0.0, 14.0, 10.0));
        slice.resolve(None).unwrap();

        assert!((clip::total_area(slice.solids()) - 96.0).abs() < 1e-3);
        assert!((clip::total_area(slice.support_solids()) - 40.0).abs() < 1e-3);
        assert!(clip::intersection(slice.solids(), slice.support_solids()).is_empty());
    }

    #[test]
    fn test_clipped_paths_keep_outside_parts() {
        let mut slice = Slice::new(0.1, 0, 0.2);
        slice.inputs_mut().solids.push(rect(0.0, 0.0, 10.0, 10.0));
        slice
            .inputs_mut()
            .clipped_paths
            .push(Polyline::new(vec![Point2::new(5.0, 5.0), Point2::new(15.0, 5.0)]));
        slice.resolve(None).unwrap();

        let total: f64 = slice.paths().iter().map(Polyline::length).sum();
        assert!((total - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_multi_hole_solid_with_overlapping_holes() {
        let outer = Polygon::rectangle(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
        let a = Polygon::rectangle(Point2::new(2.0, 2.0), Point2::new(6.0, 6.0));
        let b = Polygon::rectangle(Point2::new(4.0, 4.0), Point2::new(8.0, 8.0));
        let mut slice = Slice::new(0.1, 0, 0.2);
        slice.inputs_mut().solids.push(Region::new(outer, vec![a, b]));
        slice.resolve(None).unwrap();

        assert!((clip::total_area(slice.solids()) - 72.0).abs() < 1e-3);
    }
}
