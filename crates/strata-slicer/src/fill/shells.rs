//! Concentric perimeter shells.

use crate::clip::{self, OffsetJoin, MIN_AREA};
use crate::fill::{CurveSet, FillType};
use crate::region::Region;

/// Concentric inset loops.
///
/// The first shell is inset half a tool width from the region boundary so
/// that its outer edge lands on the boundary; each further shell is inset by
/// `spacing`.
#[derive(Debug, Clone)]
pub struct ShellsFill {
    /// Extrusion width.
    pub tool_width: f64,
    /// Distance between neighboring shells.
    pub spacing: f64,
    /// Maximum number of shells.
    pub count: usize,
    /// Inset the first shell by half a tool width.
    pub inset_from_boundary: bool,
    /// Drop inner-shell sections thinner than a tool width.
    pub filter_self_overlaps: bool,
    /// Fill type of the first shell.
    pub outer_fill: FillType,
    /// Fill type of the remaining shells.
    pub inner_fill: FillType,
}

/// Shells and the area inside them.
#[derive(Debug, Clone, Default)]
pub struct ShellsResult {
    /// One curve set per shell, outermost first.
    pub shells: Vec<CurveSet>,
    /// Residual area inside the innermost shell.
    pub inner_regions: Vec<Region>,
}

impl ShellsFill {
    /// Perimeter shells with default options.
    pub fn new(tool_width: f64, spacing: f64, count: usize) -> Self {
        Self {
            tool_width,
            spacing,
            count,
            inset_from_boundary: true,
            filter_self_overlaps: false,
            outer_fill: FillType::OuterShell,
            inner_fill: FillType::InnerShell,
        }
    }

    /// Compute shells for `region`.
    pub fn compute(&self, region: &Region) -> ShellsResult {
        let mut result = ShellsResult::default();
        if self.count == 0 {
            result.inner_regions = vec![region.clone()];
            return result;
        }

        let start = std::slice::from_ref(region);
        let mut current = if self.inset_from_boundary {
            clip::shrink(start, self.tool_width / 2.0, OffsetJoin::Miter)
        } else {
            start.to_vec()
        };
        current = clip::remove_small(current, MIN_AREA);

        let mut innermost: Vec<Region> = Vec::new();
        for k in 0..self.count {
            if current.is_empty() {
                break;
            }
            let fill = if k == 0 {
                self.outer_fill
            } else {
                self.inner_fill
            };
            result.shells.push(CurveSet::from_loops(
                current.iter().flat_map(|r| r.loops().cloned()),
                fill,
            ));

            let mut next = clip::shrink(&current, self.spacing, OffsetJoin::Miter);
            if self.filter_self_overlaps && !next.is_empty() {
                next = clip::opening(&next, self.tool_width * 0.45, OffsetJoin::Miter);
            }
            innermost = std::mem::replace(&mut current, clip::remove_small(next, MIN_AREA));
        }

        if !innermost.is_empty() {
            result.inner_regions = clip::remove_small(
                clip::shrink(&innermost, self.spacing / 2.0, OffsetJoin::Miter),
                MIN_AREA,
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_math::Point2;

    use crate::path::Polygon;

    fn square(size: f64) -> Region {
        Region::simple(Polygon::rectangle(Point2::origin(), Point2::new(size, size)))
    }

    fn loop_side(set: &CurveSet) -> f64 {
        let (min, max) = set.loops[0].polygon.bounds();
        max.x - min.x
    }

    #[test]
    fn test_two_shells_and_residual() {
        let result = ShellsFill::new(0.4, 0.4, 2).compute(&square(2.0));

        assert_eq!(result.shells.len(), 2);
        assert_eq!(result.shells[0].loops[0].fill, FillType::OuterShell);
        assert_eq!(result.shells[1].loops[0].fill, FillType::InnerShell);
        // Insets of 0.2 and 0.6, residual inset of 0.8.
        assert!((loop_side(&result.shells[0]) - 1.6).abs() < 1e-3);
        assert!((loop_side(&result.shells[1]) - 0.8).abs() < 1e-3);
        assert_eq!(result.inner_regions.len(), 1);
        let (min, max) = result.inner_regions[0].bounds();
        assert!((max.x - min.x - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_shells_stop_when_inset_vanishes() {
        // A unit square holds one 0.4 mm shell; the second inset is empty.
        let result = ShellsFill::new(0.4, 0.4, 2).compute(&square(1.0));
        assert_eq!(result.shells.len(), 1);
        assert!((loop_side(&result.shells[0]) - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_hole_gets_its_own_loop() {
        let outer = Polygon::rectangle(Point2::origin(), Point2::new(10.0, 10.0));
        let hole = Polygon::rectangle(Point2::new(4.0, 4.0), Point2::new(6.0, 6.0));
        let result = ShellsFill::new(0.4, 0.4, 1).compute(&Region::new(outer, vec![hole]));
        assert_eq!(result.shells[0].loops.len(), 2);
    }

    #[test]
    fn test_overlap_filter_keeps_outer_shell() {
        // A 1.4 mm strip: the second shell would be a 0.2 mm wide sliver.
        let strip = Region::simple(Polygon::rectangle(Point2::origin(), Point2::new(20.0, 1.4)));
        let mut fill = ShellsFill::new(0.4, 0.4, 3);
        assert_eq!(fill.compute(&strip).shells.len(), 2);

        fill.filter_self_overlaps = true;
        let result = fill.compute(&strip);
        assert_eq!(result.shells.len(), 1);
        assert!((result.shells[0].loops[0].polygon.area() - 19.6).abs() < 1e-2);
    }

    #[test]
    fn test_zero_shells_leave_region_untouched() {
        let result = ShellsFill::new(0.4, 0.4, 0).compute(&square(3.0));
        assert!(result.shells.is_empty());
        assert!((result.inner_regions[0].area() - 9.0).abs() < 1e-12);
    }
}
