//! Closed loops and open polylines in the layer plane.

use strata_math::{segment_distance, Point2, Vec2};

/// A 2D polygon (closed path). The closing edge is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Vertices of the polygon in order.
    pub points: Vec<Point2>,
}

impl Polygon {
    /// Loop through `points`.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle with CCW winding.
    pub fn rectangle(min: Point2, max: Point2) -> Self {
        Self::new(vec![
            min,
            Point2::new(max.x, min.y),
            max,
            Point2::new(min.x, max.y),
        ])
    }

    /// Regular `segments`-gon approximating a circle, CCW.
    pub fn circle(center: Point2, radius: f64, segments: usize) -> Self {
        let n = segments.max(3);
        let points = (0..n)
            .map(|i| {
                let a = i as f64 / n as f64 * std::f64::consts::TAU;
                Point2::new(center.x + radius * a.cos(), center.y + radius * a.sin())
            })
            .collect();
        Self::new(points)
    }

    /// Check if the polygon is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Shoelace area: positive when counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        self.edges().map(|(a, b)| a.x * b.y - b.x * a.y).sum::<f64>() / 2.0
    }

    /// Unsigned area.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Is the polygon counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Ensure counter-clockwise winding.
    pub fn ensure_ccw(&mut self) {
        if !self.is_ccw() {
            self.reverse();
        }
    }

    /// Ensure clockwise winding.
    pub fn ensure_cw(&mut self) {
        if self.is_ccw() {
            self.reverse();
        }
    }

    /// Length of the closed boundary.
    pub fn perimeter(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.edges().map(|(a, b)| (b - a).norm()).sum()
    }

    /// Vertex average; the origin for an empty polygon.
    pub fn centroid(&self) -> Point2 {
        if self.points.is_empty() {
            return Point2::origin();
        }
        let sum: Vec2 = self.points.iter().map(|p| p.coords).sum();
        Point2::from(sum / self.points.len() as f64)
    }

    /// Bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Point2, Point2) {
        let mut min = Point2::new(f64::MAX, f64::MAX);
        let mut max = Point2::new(f64::MIN, f64::MIN);
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Iterate the edges, including the closing one.
    pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Even-odd containment: counts boundary crossings of a ray towards +x.
    pub fn contains(&self, point: &Point2) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        self.edges()
            .filter(|(a, b)| (a.y > point.y) != (b.y > point.y))
            .filter(|(a, b)| point.x < a.x + (b.x - a.x) * (point.y - a.y) / (b.y - a.y))
            .count()
            % 2
            == 1
    }

    /// Shortest distance from `point` to the boundary.
    pub fn boundary_distance(&self, point: &Point2) -> f64 {
        self.edges()
            .map(|(a, b)| segment_distance(point, &a, &b))
            .fold(f64::MAX, f64::min)
    }

    /// Index of and distance to the vertex closest to `point`.
    pub fn nearest_vertex(&self, point: &Point2) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - point).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Copy of the polygon whose first vertex is `start`.
    pub fn rotated(&self, start: usize) -> Polygon {
        let mut points = self.points.clone();
        if !points.is_empty() {
            let len = points.len();
            points.rotate_left(start % len);
        }
        Polygon::new(points)
    }
}

/// An open polyline (non-closed path).
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    /// Points along the path.
    pub points: Vec<Point2>,
}

impl Polyline {
    /// Polyline through `points`.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Arc length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// First point.
    pub fn start(&self) -> Option<&Point2> {
        self.points.first()
    }

    /// Last point.
    pub fn end(&self) -> Option<&Point2> {
        self.points.last()
    }

    /// Walk the other way.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Bounding box as `(min, max)`.
    pub fn bounds(&self) -> (Point2, Point2) {
        Polygon::new(self.points.clone()).bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point2::origin(), Point2::new(size, size))
    }

    #[test]
    fn test_area_and_winding() {
        let mut sq = square(2.0);
        assert!((sq.signed_area() - 4.0).abs() < 1e-12);
        assert!((sq.perimeter() - 8.0).abs() < 1e-12);
        assert_eq!(sq.centroid(), Point2::new(1.0, 1.0));
        sq.ensure_cw();
        assert!(sq.signed_area() < 0.0);
    }

    #[test]
    fn test_containment() {
        let sq = square(10.0);
        assert!(sq.contains(&Point2::new(5.0, 5.0)));
        assert!(!sq.contains(&Point2::new(15.0, 5.0)));
        assert!(!sq.contains(&Point2::new(-1.0, 5.0)));
        // Concave notch.
        let notch = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(5.0, 2.0),
            Point2::new(0.0, 10.0),
        ]);
        assert!(!notch.contains(&Point2::new(5.0, 6.0)));
        assert!(notch.contains(&Point2::new(5.0, 1.0)));
    }

    #[test]
    fn test_nearest_vertex_and_rotation() {
        let square = square(10.0);
        let (idx, dist) = square.nearest_vertex(&Point2::new(11.0, 11.0)).unwrap();
        assert_eq!(idx, 2);
        assert!((dist - 2f64.sqrt()).abs() < 1e-12);

        let rotated = square.rotated(idx);
        assert_eq!(rotated.points[0], Point2::new(10.0, 10.0));
        assert!((rotated.signed_area() - square.signed_area()).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_distance() {
        let square = square(10.0);
        assert!((square.boundary_distance(&Point2::new(5.0, 2.0)) - 2.0).abs() < 1e-12);
        assert!((square.boundary_distance(&Point2::new(13.0, 5.0)) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_circle_area_converges() {
        let circle = Polygon::circle(Point2::origin(), 1.0, 64);
        assert!((circle.area() - std::f64::consts::PI).abs() < 0.01);
        assert!(circle.is_ccw());
    }

    #[test]
    fn test_polyline_length() {
        let mut line = Polyline::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 4.0),
            Point2::new(3.0, 10.0),
        ]);
        assert!((line.length() - 11.0).abs() < 1e-12);
        line.reverse();
        assert_eq!(line.start(), Some(&Point2::new(3.0, 10.0)));
    }
}
