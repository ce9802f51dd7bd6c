//! Polygon-with-holes regions.

use geo::{Coord, LineString, Polygon as GeoPolygon};
use strata_math::Point2;

use crate::path::Polygon;

/// A filled area: one simple outer boundary plus non-overlapping holes.
///
/// The outer boundary is kept counter-clockwise and holes clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Outer boundary (CCW).
    pub outer: Polygon,
    /// Holes (CW), each strictly inside `outer`.
    pub holes: Vec<Polygon>,
}

impl Region {
    /// Create a region, normalizing winding order.
    pub fn new(mut outer: Polygon, holes: Vec<Polygon>) -> Self {
        outer.ensure_ccw();
        let holes = holes
            .into_iter()
            .map(|mut h| {
                h.ensure_cw();
                h
            })
            .collect();
        Self { outer, holes }
    }

    /// Region without holes.
    pub fn simple(outer: Polygon) -> Self {
        Self::new(outer, Vec::new())
    }

    /// Area of the outer boundary minus the holes.
    pub fn area(&self) -> f64 {
        self.outer.area() - self.holes.iter().map(Polygon::area).sum::<f64>()
    }

    /// Is the point inside the filled area?
    pub fn contains(&self, point: &Point2) -> bool {
        self.outer.contains(point) && !self.holes.iter().any(|h| h.contains(point))
    }

    /// Outer boundary followed by the holes.
    pub fn loops(&self) -> impl Iterator<Item = &Polygon> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    /// Shortest distance from `point` to any boundary loop.
    pub fn boundary_distance(&self, point: &Point2) -> f64 {
        self.loops()
            .map(|l| l.boundary_distance(point))
            .fold(f64::MAX, f64::min)
    }

    /// Distance from `point` to the filled area (zero inside).
    pub fn distance(&self, point: &Point2) -> f64 {
        if self.contains(point) {
            0.0
        } else {
            self.boundary_distance(point)
        }
    }

    /// Bounding box of the outer boundary.
    pub fn bounds(&self) -> (Point2, Point2) {
        self.outer.bounds()
    }

    /// Total boundary length, holes included.
    pub fn perimeter(&self) -> f64 {
        self.loops().map(Polygon::perimeter).sum()
    }

    pub(crate) fn to_geo(&self) -> GeoPolygon<f64> {
        GeoPolygon::new(
            ring_to_geo(&self.outer),
            self.holes.iter().map(ring_to_geo).collect(),
        )
    }

    pub(crate) fn from_geo(poly: &GeoPolygon<f64>) -> Self {
        Self::new(
            ring_from_geo(poly.exterior()),
            poly.interiors().iter().map(ring_from_geo).collect(),
        )
    }
}

fn ring_to_geo(ring: &Polygon) -> LineString<f64> {
    LineString::new(
        ring.points
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect(),
    )
}

fn ring_from_geo(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point2> = ring.coords().map(|c| Point2::new(c.x, c.y)).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::new(points)
}

/// Combined bounding box of several regions.
pub fn regions_bounds(regions: &[Region]) -> Option<(Point2, Point2)> {
    regions.iter().map(Region::bounds).reduce(|(amin, amax), (bmin, bmax)| {
        (
            Point2::new(amin.x.min(bmin.x), amin.y.min(bmin.y)),
            Point2::new(amax.x.max(bmax.x), amax.y.max(bmax.y)),
        )
    })
}

/// Distance from `point` to the nearest region (zero inside any of them).
pub fn distance_to_regions(point: &Point2, regions: &[Region]) -> f64 {
    regions
        .iter()
        .map(|r| r.distance(point))
        .fold(f64::MAX, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed_square() -> Region {
        let outer = Polygon::rectangle(Point2::origin(), Point2::new(10.0, 10.0));
        let hole = Polygon::rectangle(Point2::new(4.0, 4.0), Point2::new(6.0, 6.0));
        Region::new(outer, vec![hole])
    }

    #[test]
    fn test_winding_normalized() {
        let region = framed_square();
        assert!(region.outer.is_ccw());
        assert!(!region.holes[0].is_ccw());
        assert!((region.area() - 96.0).abs() < 1e-12);
    }

    #[test]
    fn test_contains_respects_holes() {
        let region = framed_square();
        assert!(region.contains(&Point2::new(1.0, 1.0)));
        assert!(!region.contains(&Point2::new(5.0, 5.0)));
        assert!((region.distance(&Point2::new(5.0, 5.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_geo_round_trip_keeps_vertex_count() {
        let region = framed_square();
        let back = Region::from_geo(&region.to_geo());
        assert_eq!(back.outer.len(), 4);
        assert_eq!(back.holes[0].len(), 4);
    }
}
