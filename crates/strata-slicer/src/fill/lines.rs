//! Parallel-line fills.
//!
//! Lines are cast across the region at a fixed angle; each line is cut into
//! spans by the region boundary. Spans on neighboring lines can be threaded
//! into one long curve by walking the boundary between their ends.

use geo::{MinimumRotatedRect, Simplify};
use strata_math::{Point2, Vec2};

use crate::fill::{CurveSet, FillType};
use crate::path::{Polygon, Polyline};
use crate::region::Region;

/// Longest boundary connector, in line spacings.
const CONNECTOR_LIMIT: f64 = 3.0;

/// Parameters shared by the line-based strategies.
#[derive(Debug, Clone)]
pub struct LinesFill {
    /// Extrusion width.
    pub tool_width: f64,
    /// Distance between lines.
    pub spacing: f64,
    /// Line direction in degrees from +X. Ignored by bridge fill.
    pub angle: f64,
    /// Fill type assigned to the curves.
    pub fill: FillType,
}

/// Behavior variants of [`LinesFill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinesMode {
    /// Spans threaded into long runs.
    Connected,
    /// Independent spans in alternating directions.
    Raster,
    /// Threaded runs on a global grid, heavily simplified.
    Sparse,
    /// Same as sparse, for support.
    Support,
    /// Threaded runs across the region's narrow direction.
    Bridge,
}

impl LinesMode {
    fn connects(self) -> bool {
        !matches!(self, LinesMode::Raster)
    }

    fn grid_aligned(self) -> bool {
        matches!(self, LinesMode::Sparse | LinesMode::Support)
    }

    fn simplify_fraction(self) -> f64 {
        match self {
            LinesMode::Sparse | LinesMode::Support => 0.25,
            _ => 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f64,
    loop_idx: usize,
    edge: usize,
    s: f64,
    point: Point2,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: Hit,
    end: Hit,
}

impl LinesFill {
    /// Create line-fill parameters.
    pub fn new(tool_width: f64, spacing: f64, angle: f64, fill: FillType) -> Self {
        Self {
            tool_width,
            spacing,
            angle,
            fill,
        }
    }

    /// Fill `region` with lines in the given mode.
    pub fn compute(&self, region: &Region, mode: LinesMode) -> CurveSet {
        if self.spacing <= 0.0 || region.outer.len() < 3 {
            return CurveSet::new();
        }
        let angle = match mode {
            LinesMode::Bridge => bridge_angle(region).unwrap_or(self.angle),
            _ => self.angle,
        };

        let loops: Vec<&Polygon> = region.loops().collect();
        let rays = self.cast(&loops, angle.to_radians(), mode.grid_aligned());

        let curves = if mode.connects() {
            thread_spans(&loops, &rays, self.spacing * CONNECTOR_LIMIT)
        } else {
            rays.iter()
                .enumerate()
                .flat_map(|(i, spans)| {
                    spans.iter().map(move |s| {
                        let mut line = Polyline::new(vec![s.start.point, s.end.point]);
                        if i % 2 == 1 {
                            line.reverse();
                        }
                        line
                    })
                })
                .collect()
        };

        let tolerance = self.tool_width * mode.simplify_fraction();
        CurveSet::from_curves(
            curves.into_iter().map(|c| simplify_polyline(c, tolerance)),
            self.fill,
        )
    }

    /// Spans of every line, bottom line first, each sorted along the line.
    fn cast(&self, loops: &[&Polygon], angle: f64, aligned: bool) -> Vec<Vec<Span>> {
        let dir = Vec2::new(angle.cos(), angle.sin());
        let normal = Vec2::new(-dir.y, dir.x);

        let (lo, hi) = loops
            .iter()
            .flat_map(|l| l.points.iter())
            .map(|p| normal.dot(&p.coords))
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));

        let first = if aligned {
            (lo / self.spacing).ceil() * self.spacing
        } else {
            lo + self.spacing / 2.0
        };
        let min_span = self.tool_width * 0.25;

        let mut rays = Vec::new();
        let mut k = 0usize;
        loop {
            let c = first + k as f64 * self.spacing;
            if c >= hi {
                break;
            }
            k += 1;

            let mut hits = Vec::new();
            for (li, l) in loops.iter().enumerate() {
                let n = l.len();
                for e in 0..n {
                    let a = l.points[e];
                    let b = l.points[(e + 1) % n];
                    let (pa, pb) = (normal.dot(&a.coords), normal.dot(&b.coords));
                    if (pa < c) == (pb < c) {
                        continue;
                    }
                    let s = (c - pa) / (pb - pa);
                    let point = a + (b - a) * s;
                    hits.push(Hit {
                        t: dir.dot(&point.coords),
                        loop_idx: li,
                        edge: e,
                        s,
                        point,
                    });
                }
            }
            hits.sort_by(|a, b| a.t.total_cmp(&b.t));

            let spans: Vec<Span> = hits
                .chunks_exact(2)
                .map(|pair| Span {
                    start: pair[0],
                    end: pair[1],
                })
                .filter(|s| s.end.t - s.start.t >= min_span)
                .collect();
            if !spans.is_empty() {
                rays.push(spans);
            }
        }
        rays
    }
}

/// Link spans on consecutive lines through short boundary walks.
fn thread_spans(loops: &[&Polygon], rays: &[Vec<Span>], limit: f64) -> Vec<Polyline> {
    let arcs: Vec<LoopArc> = loops.iter().map(|l| LoopArc::new(l)).collect();
    let mut used: Vec<Vec<bool>> = rays.iter().map(|r| vec![false; r.len()]).collect();
    let mut chains = Vec::new();

    for r in 0..rays.len() {
        for si in 0..rays[r].len() {
            if used[r][si] {
                continue;
            }
            used[r][si] = true;
            let span = rays[r][si];
            let mut points = vec![span.start.point, span.end.point];
            let mut tail = span.end;
            let mut ray = r;

            while ray + 1 < rays.len() {
                let next = ray + 1;
                let mut best: Option<(usize, Hit, Hit, f64, Vec<Point2>)> = None;
                for (ci, cand) in rays[next].iter().enumerate() {
                    if used[next][ci] {
                        continue;
                    }
                    for (entry, exit) in [(cand.start, cand.end), (cand.end, cand.start)] {
                        if entry.loop_idx != tail.loop_idx {
                            continue;
                        }
                        let (len, walk) = arcs[tail.loop_idx].walk(loops[tail.loop_idx], &tail, &entry);
                        if len <= limit && best.as_ref().map_or(true, |b| len < b.3) {
                            best = Some((ci, entry, exit, len, walk));
                        }
                    }
                }
                let Some((ci, entry, exit, _, walk)) = best else {
                    break;
                };
                used[next][ci] = true;
                points.extend(walk);
                points.push(entry.point);
                points.push(exit.point);
                tail = exit;
                ray = next;
            }

            points.dedup_by(|a, b| (*a - *b).norm() < 1.0e-9);
            chains.push(Polyline::new(points));
        }
    }
    chains
}

/// Arc-length parameterization of a loop.
struct LoopArc {
    offsets: Vec<f64>,
    lengths: Vec<f64>,
    perimeter: f64,
}

impl LoopArc {
    fn new(polygon: &Polygon) -> Self {
        let lengths: Vec<f64> = polygon.edges().map(|(a, b)| (b - a).norm()).collect();
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut total = 0.0;
        for l in &lengths {
            offsets.push(total);
            total += l;
        }
        Self {
            offsets,
            lengths,
            perimeter: total,
        }
    }

    fn position(&self, hit: &Hit) -> f64 {
        self.offsets[hit.edge] + hit.s * self.lengths[hit.edge]
    }

    /// Shorter way around the loop from `a` to `b`: its length and the loop
    /// vertices passed on the way.
    fn walk(&self, polygon: &Polygon, a: &Hit, b: &Hit) -> (f64, Vec<Point2>) {
        let n = polygon.len();
        let forward = (self.position(b) - self.position(a)).rem_euclid(self.perimeter);
        let backward = self.perimeter - forward;

        if forward <= backward {
            let mut count = (b.edge + n - a.edge) % n;
            if count == 0 && b.s < a.s {
                count = n;
            }
            let points = (1..=count).map(|k| polygon.points[(a.edge + k) % n]).collect();
            (forward, points)
        } else {
            let mut count = (a.edge + n - b.edge) % n;
            if count == 0 && b.s > a.s {
                count = n;
            }
            let points = (0..count).map(|k| polygon.points[(a.edge + n - k) % n]).collect();
            (backward, points)
        }
    }
}

/// Direction along the short side of the region's minimum-area bounding
/// rectangle, in degrees.
fn bridge_angle(region: &Region) -> Option<f64> {
    let rect = region.to_geo().minimum_rotated_rect()?;
    let c = &rect.exterior().0;
    if c.len() < 3 {
        return None;
    }
    let e0 = Vec2::new(c[1].x - c[0].x, c[1].y - c[0].y);
    let e1 = Vec2::new(c[2].x - c[1].x, c[2].y - c[1].y);
    let short = if e0.norm() <= e1.norm() { e0 } else { e1 };
    Some(short.y.atan2(short.x).to_degrees())
}

fn simplify_polyline(line: Polyline, tolerance: f64) -> Polyline {
    if line.len() <= 2 || tolerance <= 0.0 {
        return line;
    }
    let ls: geo::LineString<f64> = line.points.iter().map(|p| (p.x, p.y)).collect();
    Polyline::new(
        ls.simplify(&tolerance)
            .coords()
            .map(|c| Point2::new(c.x, c.y))
            .collect(),
    )
}
