//! Polygon boolean and offset operations.
//!
//! Regions are handed to the Clipper engine through `geo-clipper`; every
//! operation returns fresh, non-overlapping [`Region`]s. Open polylines are
//! clipped locally against region boundaries.

use geo::{MultiPolygon, Simplify};
use geo_clipper::{Clipper, EndType, JoinType};
use strata_math::{cross2, lerp2, Point2, Tolerance};

use crate::path::{Polygon, Polyline};
use crate::region::Region;

/// Fixed-point scale used when converting to Clipper's integer space.
const CLIPPER_SCALE: f64 = 10_000.0;

/// Regions and holes smaller than this are treated as degenerate (mm²).
pub const MIN_AREA: f64 = 1.0e-3;

/// Corner treatment for offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoin {
    /// Sharp corners (limited to twice the offset distance).
    #[default]
    Miter,
    /// Rounded corners.
    Round,
    /// Squared-off corners.
    Square,
}

impl From<OffsetJoin> for JoinType {
    fn from(join: OffsetJoin) -> Self {
        match join {
            OffsetJoin::Miter => JoinType::Miter(2.0),
            OffsetJoin::Round => JoinType::Round(0.005),
            OffsetJoin::Square => JoinType::Square,
        }
    }
}

fn to_multi(regions: &[Region]) -> MultiPolygon<f64> {
    MultiPolygon::new(regions.iter().map(Region::to_geo).collect())
}

fn from_multi(multi: &MultiPolygon<f64>) -> Vec<Region> {
    multi
        .0
        .iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .map(Region::from_geo)
        .filter(|r| r.outer.area() > 0.0)
        .collect()
}

/// Union of every region in the set.
pub fn union_all(regions: &[Region]) -> Vec<Region> {
    match regions {
        [] => Vec::new(),
        [first, rest @ ..] if rest.is_empty() => {
            let single = to_multi(std::slice::from_ref(first));
            from_multi(&single.union(&single, CLIPPER_SCALE))
        }
        [first, rest @ ..] => {
            let subject = to_multi(std::slice::from_ref(first));
            from_multi(&subject.union(&to_multi(rest), CLIPPER_SCALE))
        }
    }
}

/// Union of two region sets.
pub fn union(a: &[Region], b: &[Region]) -> Vec<Region> {
    if a.is_empty() {
        return union_all(b);
    }
    if b.is_empty() {
        return union_all(a);
    }
    from_multi(&to_multi(a).union(&to_multi(b), CLIPPER_SCALE))
}

/// Area covered by `a` but not by `b`.
pub fn difference(a: &[Region], b: &[Region]) -> Vec<Region> {
    if a.is_empty() {
        return Vec::new();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    from_multi(&to_multi(a).difference(&to_multi(b), CLIPPER_SCALE))
}

/// Area covered by both `a` and `b`.
pub fn intersection(a: &[Region], b: &[Region]) -> Vec<Region> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    from_multi(&to_multi(a).intersection(&to_multi(b), CLIPPER_SCALE))
}

/// Offset regions; positive `delta` grows, negative shrinks.
pub fn offset(regions: &[Region], delta: f64, join: OffsetJoin) -> Vec<Region> {
    if regions.is_empty() {
        return Vec::new();
    }
    if delta == 0.0 {
        return regions.to_vec();
    }
    let result = to_multi(regions).offset(delta, join.into(), EndType::ClosedPolygon, CLIPPER_SCALE);
    from_multi(&result)
}

/// Grow regions outward by `distance`.
pub fn grow(regions: &[Region], distance: f64, join: OffsetJoin) -> Vec<Region> {
    offset(regions, distance.abs(), join)
}

/// Shrink regions inward by `distance`.
pub fn shrink(regions: &[Region], distance: f64, join: OffsetJoin) -> Vec<Region> {
    offset(regions, -distance.abs(), join)
}

/// Morphological closing: dilate, union, erode.
///
/// Merges polygons closer than `2 * distance` and rounds jagged outlines.
pub fn closing(regions: &[Region], distance: f64) -> Vec<Region> {
    if regions.is_empty() || distance <= 0.0 {
        return union_all(regions);
    }
    shrink(&grow(regions, distance, OffsetJoin::Round), distance, OffsetJoin::Round)
}

/// Morphological opening: erode then dilate, removing features thinner than
/// `2 * distance`.
pub fn opening(regions: &[Region], distance: f64, join: OffsetJoin) -> Vec<Region> {
    if regions.is_empty() || distance <= 0.0 {
        return regions.to_vec();
    }
    grow(&shrink(regions, distance, join), distance, join)
}

/// Drop regions below `min_area` and fill holes below it.
pub fn remove_small(regions: Vec<Region>, min_area: f64) -> Vec<Region> {
    regions
        .into_iter()
        .filter_map(|mut r| {
            r.holes.retain(|h| h.area() >= min_area);
            (r.area() >= min_area).then_some(r)
        })
        .collect()
}

/// Ramer-Douglas-Peucker simplification of every boundary loop.
pub fn simplify(regions: &[Region], tolerance: f64) -> Vec<Region> {
    let simplified = regions
        .iter()
        .map(|r| Region::from_geo(&Simplify::simplify(&r.to_geo(), &tolerance)))
        .filter(|r| r.outer.len() >= 3)
        .collect();
    remove_small(simplified, MIN_AREA)
}

/// Total filled area of a set of regions.
pub fn total_area(regions: &[Region]) -> f64 {
    regions.iter().map(Region::area).sum()
}

/// Circular region ("dot") of the given diameter.
pub fn dot(center: Point2, diameter: f64) -> Region {
    Region::simple(Polygon::circle(center, diameter / 2.0, 16))
}

/// Convert polylines into solid strips `width` wide with round joints.
pub fn thicken_polylines(lines: &[Polyline], width: f64) -> Vec<Region> {
    let half = width / 2.0;
    let mut pieces = Vec::new();

    for line in lines {
        for p in &line.points {
            pieces.push(Region::simple(Polygon::circle(*p, half, 12)));
        }
        for w in line.points.windows(2) {
            let d = w[1] - w[0];
            let len = d.norm();
            if Tolerance::DEFAULT.is_zero(len) {
                continue;
            }
            let n = Point2::new(-d.y / len * half, d.x / len * half);
            let strip = Polygon::new(vec![
                Point2::new(w[0].x - n.x, w[0].y - n.y),
                Point2::new(w[1].x - n.x, w[1].y - n.y),
                Point2::new(w[1].x + n.x, w[1].y + n.y),
                Point2::new(w[0].x + n.x, w[0].y + n.y),
            ]);
            pieces.push(Region::simple(strip));
        }
    }

    union_all(&pieces)
}

/// Clip polylines against regions, keeping the parts inside
/// (`keep_inside = true`) or outside them.
pub fn clip_polylines(lines: &[Polyline], regions: &[Region], keep_inside: bool) -> Vec<Polyline> {
    if regions.is_empty() {
        return if keep_inside { Vec::new() } else { lines.to_vec() };
    }

    let edges: Vec<(Point2, Point2)> = regions
        .iter()
        .flat_map(|r| r.loops().flat_map(|l| l.edges().collect::<Vec<_>>()))
        .collect();
    let inside = |p: &Point2| regions.iter().any(|r| r.contains(p));

    let mut result = Vec::new();
    for line in lines {
        let mut current: Vec<Point2> = Vec::new();
        for w in line.points.windows(2) {
            let (p, q) = (w[0], w[1]);
            let mut cuts = vec![0.0, 1.0];
            cuts.extend(edges.iter().filter_map(|(a, b)| segment_cut(&p, &q, a, b)));
            cuts.sort_by(f64::total_cmp);
            cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

            for span in cuts.windows(2) {
                let a = lerp2(&p, &q, span[0]);
                let b = lerp2(&p, &q, span[1]);
                let mid = lerp2(&p, &q, (span[0] + span[1]) / 2.0);
                if inside(&mid) == keep_inside {
                    if current.last().map_or(true, |last| !Tolerance::DEFAULT.points_equal(last, &a)) {
                        flush_polyline(&mut current, &mut result);
                        current.push(a);
                    }
                    current.push(b);
                } else {
                    flush_polyline(&mut current, &mut result);
                }
            }
        }
        flush_polyline(&mut current, &mut result);
    }
    result
}

fn flush_polyline(current: &mut Vec<Point2>, out: &mut Vec<Polyline>) {
    if current.len() >= 2 {
        out.push(Polyline::new(std::mem::take(current)));
    } else {
        current.clear();
    }
}

/// Parameter along `p`-`q` where it crosses segment `a`-`b`, if strictly inside.
fn segment_cut(p: &Point2, q: &Point2, a: &Point2, b: &Point2) -> Option<f64> {
    let r = q - p;
    let s = b - a;
    let denom = cross2(&r, &s);
    if denom.abs() < 1e-14 {
        return None;
    }
    let ap = a - p;
    let t = cross2(&ap, &s) / denom;
    let u = cross2(&ap, &r) / denom;
    (t > 0.0 && t < 1.0 && (-1e-12..=1.0 + 1e-12).contains(&u)).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: f64, y: f64, size: f64) -> Region {
        Region::simple(Polygon::rectangle(
            Point2::new(x, y),
            Point2::new(x + size, y + size),
        ))
    }

    #[test]
    fn test_union_overlapping() {
        let merged = union(&[square(0.0, 0.0, 10.0)], &[square(5.0, 0.0, 10.0)]);
        assert_eq!(merged.len(), 1);
        assert_relative_eq!(total_area(&merged), 150.0, epsilon = 1e-3);
    }

    #[test]
    fn test_difference_creates_hole() {
        let result = difference(&[square(0.0, 0.0, 10.0)], &[square(4.0, 4.0, 2.0)]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].holes.len(), 1);
        assert_relative_eq!(result[0].area(), 96.0, epsilon = 1e-3);
    }

    #[test]
    fn test_intersection_no_overlap() {
        assert!(intersection(&[square(0.0, 0.0, 1.0)], &[square(5.0, 5.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_shrink_square_miter() {
        let inset = shrink(&[square(0.0, 0.0, 10.0)], 1.0, OffsetJoin::Miter);
        assert_eq!(inset.len(), 1);
        assert_relative_eq!(inset[0].area(), 64.0, epsilon = 1e-3);
    }

    #[test]
    fn test_shrink_to_nothing() {
        assert!(shrink(&[square(0.0, 0.0, 1.0)], 0.6, OffsetJoin::Miter).is_empty());
    }

    #[test]
    fn test_grow_then_shrink_convex_restores_area() {
        let pentagon = Region::simple(Polygon::circle(Point2::new(3.0, -2.0), 5.0, 5));
        let original = pentagon.area();
        for join in [OffsetJoin::Miter, OffsetJoin::Round] {
            let restored = shrink(&grow(&[pentagon.clone()], 0.8, join), 0.8, join);
            let err = (total_area(&restored) - original).abs() / original;
            assert!(err < 0.01, "{join:?}: relative area error {err}");
        }
    }

    #[test]
    fn test_closing_merges_near_miss() {
        let merged = closing(&[square(0.0, 0.0, 5.0), square(5.2, 0.0, 5.0)], 0.2);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_remove_small_fills_tiny_holes() {
        let mut region = square(0.0, 0.0, 10.0);
        region
            .holes
            .push(Polygon::rectangle(Point2::new(5.0, 5.0), Point2::new(5.01, 5.01)));
        let cleaned = remove_small(vec![region, square(20.0, 0.0, 0.01)], MIN_AREA);
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned[0].holes.is_empty());
    }

    #[test]
    fn test_thicken_polyline_area() {
        let line = Polyline::new(vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)]);
        let strip = thicken_polylines(&[line], 0.4);
        assert_eq!(strip.len(), 1);
        // 10 x 0.4 body plus two half caps
        let expected = 4.0 + std::f64::consts::PI * 0.04;
        assert!((total_area(&strip) - expected).abs() < 0.02);
    }

    #[test]
    fn test_clip_polylines_inside_and_outside() {
        let line = Polyline::new(vec![Point2::new(-5.0, 5.0), Point2::new(15.0, 5.0)]);
        let regions = [square(0.0, 0.0, 10.0)];

        let inside = clip_polylines(std::slice::from_ref(&line), &regions, true);
        assert_eq!(inside.len(), 1);
        assert_relative_eq!(inside[0].length(), 10.0, epsilon = 1e-9);

        let outside = clip_polylines(&[line], &regions, false);
        assert_eq!(outside.len(), 2);
        assert_relative_eq!(outside.iter().map(Polyline::length).sum::<f64>(), 10.0, epsilon = 1e-9);
    }
}
