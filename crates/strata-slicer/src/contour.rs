//! Mesh/plane intersection and loop nesting.
//!
//! Each triangle crossing the cutting plane contributes one segment whose
//! endpoints are identified by the mesh edge they lie on, so adjacent faces
//! share endpoints exactly. The segments form a planar graph that is walked
//! into open polylines and closed loops, and closed loops are then nested into
//! regions.

use std::collections::HashMap;

use strata_math::{Point2, Tolerance};
use strata_mesh::TriangleMesh;

use crate::clip::{self, MIN_AREA};
use crate::path::{Polygon, Polyline};
use crate::region::Region;

/// Vertex position quantum used when welding mesh vertices.
const WELD_QUANTUM: f64 = 1.0e-5;

/// A triangle with welded vertex ids and its Z extent.
#[derive(Debug, Clone, Copy)]
struct Triangle {
    ids: [u32; 3],
    z_min: f64,
    z_max: f64,
}

/// Read-only, Z-sorted triangle index shared by every layer of one mesh.
#[derive(Debug, Clone)]
pub(crate) struct SectionIndex {
    positions: Vec<[f64; 3]>,
    /// Sorted by `z_min`.
    triangles: Vec<Triangle>,
    z_range: (f64, f64),
}

/// Everything one plane cut produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlaneSection {
    pub loops: Vec<Polygon>,
    pub open: Vec<Polyline>,
}

impl PlaneSection {
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty() && self.open.is_empty()
    }
}

impl SectionIndex {
    /// Weld coincident vertices and sort triangles by their lowest Z.
    pub fn new(mesh: &TriangleMesh) -> Self {
        let mut welded: HashMap<[i64; 3], u32> = HashMap::new();
        let mut positions: Vec<[f64; 3]> = Vec::new();
        let mut remap = Vec::with_capacity(mesh.num_vertices());

        for i in 0..mesh.num_vertices() {
            let p = mesh.vertex(i);
            let key = [
                (p.x / WELD_QUANTUM).round() as i64,
                (p.y / WELD_QUANTUM).round() as i64,
                (p.z / WELD_QUANTUM).round() as i64,
            ];
            let id = *welded.entry(key).or_insert_with(|| {
                positions.push([p.x, p.y, p.z]);
                (positions.len() - 1) as u32
            });
            remap.push(id);
        }

        let mut z_range = (f64::MAX, f64::MIN);
        let mut triangles: Vec<Triangle> = mesh
            .indices
            .chunks_exact(3)
            .filter_map(|c| {
                let ids = [remap[c[0] as usize], remap[c[1] as usize], remap[c[2] as usize]];
                // Faces collapsed by welding carry no area.
                if ids[0] == ids[1] || ids[1] == ids[2] || ids[0] == ids[2] {
                    return None;
                }
                let zs = ids.map(|id| positions[id as usize][2]);
                Some(Triangle {
                    ids,
                    z_min: zs[0].min(zs[1]).min(zs[2]),
                    z_max: zs[0].max(zs[1]).max(zs[2]),
                })
            })
            .collect();

        for t in &triangles {
            z_range.0 = z_range.0.min(t.z_min);
            z_range.1 = z_range.1.max(t.z_max);
        }
        triangles.sort_by(|a, b| a.z_min.total_cmp(&b.z_min));

        Self {
            positions,
            triangles,
            z_range,
        }
    }

    /// Lowest and highest Z of any triangle.
    pub fn z_range(&self) -> (f64, f64) {
        self.z_range
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Cut the mesh with the plane at `z`.
    pub fn section(&self, z: f64) -> PlaneSection {
        let mut graph = SectionGraph::default();
        let end = self.triangles.partition_point(|t| t.z_min <= z);

        for tri in &self.triangles[..end] {
            if tri.z_max < z {
                continue;
            }
            if let Some((from, to)) = self.crossing(tri, z) {
                graph.add_segment(from, to);
            }
        }

        graph.extract()
    }

    /// Segment where the plane crosses `tri`, oriented so that closed
    /// outward-facing surfaces produce counter-clockwise loops.
    ///
    /// Vertices exactly on the plane count as above it, so every crossing
    /// lies on a mesh edge and never on a bare vertex.
    fn crossing(&self, tri: &Triangle, z: f64) -> Option<(Node, Node)> {
        let above = tri.ids.map(|id| self.positions[id as usize][2] >= z);
        let mut up = None;
        let mut down = None;

        for k in 0..3 {
            let a = tri.ids[k];
            let b = tri.ids[(k + 1) % 3];
            match (above[k], above[(k + 1) % 3]) {
                (false, true) => up = Some(self.edge_node(a, b, z)),
                (true, false) => down = Some(self.edge_node(a, b, z)),
                _ => {}
            }
        }

        Some((down?, up?))
    }

    fn edge_node(&self, a: u32, b: u32, z: f64) -> Node {
        let key = if a < b { (a, b) } else { (b, a) };
        let pa = self.positions[key.0 as usize];
        let pb = self.positions[key.1 as usize];
        let t = (z - pa[2]) / (pb[2] - pa[2]);
        Node {
            key,
            point: Point2::new(pa[0] + t * (pb[0] - pa[0]), pa[1] + t * (pb[1] - pa[1])),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    key: (u32, u32),
    point: Point2,
}

/// Planar graph of section segments.
#[derive(Debug, Default)]
struct SectionGraph {
    ids: HashMap<(u32, u32), usize>,
    points: Vec<Point2>,
    /// Directed segments `(from, to)`.
    edges: Vec<(usize, usize)>,
    /// Incident edge ids per node.
    incident: Vec<Vec<usize>>,
}

impl SectionGraph {
    fn node(&mut self, node: Node) -> usize {
        if let Some(&id) = self.ids.get(&node.key) {
            return id;
        }
        let id = self.points.len();
        self.ids.insert(node.key, id);
        self.points.push(node.point);
        self.incident.push(Vec::new());
        id
    }

    fn add_segment(&mut self, from: Node, to: Node) {
        let a = self.node(from);
        let b = self.node(to);
        if a == b {
            return;
        }
        let e = self.edges.len();
        self.edges.push((a, b));
        self.incident[a].push(e);
        self.incident[b].push(e);
    }

    /// Walk the graph: first chains from dangling nodes, then cycles.
    fn extract(self) -> PlaneSection {
        let mut used = vec![false; self.edges.len()];
        let mut section = PlaneSection::default();

        let dangling: Vec<usize> = (0..self.points.len())
            .filter(|&n| self.incident[n].len() % 2 == 1)
            .collect();
        for start in dangling {
            if self.incident[start].iter().all(|&e| used[e]) {
                continue;
            }
            let (nodes, forward, backward) = self.walk(start, &mut used, None);
            let mut points: Vec<Point2> = nodes.iter().map(|&n| self.points[n]).collect();
            if backward > forward {
                points.reverse();
            }
            dedup_points(&mut points);
            if points.len() >= 2 {
                section.open.push(Polyline::new(points));
            }
        }

        for e in 0..self.edges.len() {
            if used[e] {
                continue;
            }
            let start = self.edges[e].0;
            let (nodes, forward, backward) = self.walk(start, &mut used, Some(start));
            let closed = nodes.len() > 2 && nodes.first() == nodes.last();
            let mut points: Vec<Point2> = nodes.iter().map(|&n| self.points[n]).collect();
            if backward > forward {
                points.reverse();
            }
            if closed {
                points.pop();
                dedup_points(&mut points);
                if points.len() >= 3 {
                    section.loops.push(Polygon::new(points));
                }
            } else {
                dedup_points(&mut points);
                if points.len() >= 2 {
                    section.open.push(Polyline::new(points));
                }
            }
        }

        section
    }

    /// Follow unused edges from `start`, preferring the segment direction.
    /// Stops at a dead end or on reaching `stop`.
    fn walk(
        &self,
        start: usize,
        used: &mut [bool],
        stop: Option<usize>,
    ) -> (Vec<usize>, usize, usize) {
        let mut nodes = vec![start];
        let mut current = start;
        let (mut forward, mut backward) = (0, 0);

        loop {
            let candidates = self.incident[current].iter().copied().filter(|&e| !used[e]);
            let next = candidates
                .clone()
                .find(|&e| self.edges[e].0 == current)
                .or_else(|| candidates.clone().next());
            let Some(e) = next else { break };
            used[e] = true;

            let (a, b) = self.edges[e];
            current = if a == current {
                forward += 1;
                b
            } else {
                backward += 1;
                a
            };
            nodes.push(current);
            if Some(current) == stop {
                break;
            }
        }

        (nodes, forward, backward)
    }
}

fn dedup_points(points: &mut Vec<Point2>) {
    points.dedup_by(|a, b| Tolerance::DEFAULT.points_equal(a, b));
}

/// Options controlling how closed loops become regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestingOptions {
    /// Treat CCW loops as outers and CW loops as holes.
    pub trust_winding: bool,
    /// Keep overlapping holes of one outer separate.
    pub allow_overlapping_holes: bool,
}

/// Group closed loops into polygons-with-holes.
///
/// Without `trust_winding`, a loop's role comes from its nesting depth:
/// even depth is an outer boundary, odd depth a hole of its parent.
pub fn nest_loops(loops: Vec<Polygon>, options: NestingOptions) -> Vec<Region> {
    let mut loops: Vec<Polygon> = loops.into_iter().filter(|l| l.area() >= MIN_AREA).collect();
    loops.sort_by(|a, b| b.area().total_cmp(&a.area()));

    // Smallest earlier (so larger) loop containing each loop.
    let parent_of = |i: usize, candidates: &dyn Fn(usize) -> bool| -> Option<usize> {
        let sample = loops[i].points[0];
        (0..i)
            .rev()
            .find(|&j| candidates(j) && loops[j].contains(&sample))
    };

    let mut is_outer = vec![false; loops.len()];
    let mut owner: Vec<Option<usize>> = vec![None; loops.len()];

    if options.trust_winding {
        for (i, l) in loops.iter().enumerate() {
            is_outer[i] = l.is_ccw();
        }
        for i in 0..loops.len() {
            if !is_outer[i] {
                owner[i] = parent_of(i, &|j| is_outer[j]);
            }
        }
    } else {
        let mut depth = vec![0usize; loops.len()];
        for i in 0..loops.len() {
            if let Some(p) = parent_of(i, &|_| true) {
                depth[i] = depth[p] + 1;
                if depth[i] % 2 == 1 {
                    owner[i] = Some(p);
                }
            }
            is_outer[i] = depth[i] % 2 == 0;
        }
    }

    let mut regions = Vec::new();
    for i in 0..loops.len() {
        if !is_outer[i] {
            continue;
        }
        let holes: Vec<Polygon> = (0..loops.len())
            .filter(|&h| owner[h] == Some(i))
            .map(|h| loops[h].clone())
            .collect();

        if holes.len() > 1 && !options.allow_overlapping_holes {
            let merged = clip::union_all(
                &holes.into_iter().map(Region::simple).collect::<Vec<_>>(),
            );
            regions.push(Region::new(
                loops[i].clone(),
                merged.into_iter().map(|r| r.outer).collect(),
            ));
        } else {
            regions.push(Region::new(loops[i].clone(), holes));
        }
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Polygon {
        Polygon::rectangle(Point2::new(min, min), Point2::new(max, max))
    }

    #[test]
    fn test_cube_section_is_ccw_square() {
        let mesh = TriangleMesh::cuboid([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let index = SectionIndex::new(&mesh);
        let section = index.section(5.0);
        assert!(section.open.is_empty());
        assert_eq!(section.loops.len(), 1);
        assert!(section.loops[0].is_ccw());
        assert!((section.loops[0].area() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_section_through_vertex_plane() {
        let mesh = TriangleMesh::cuboid([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let index = SectionIndex::new(&mesh);
        // Vertices on the plane count as above it: the bottom face yields
        // nothing while the top face still closes a loop.
        assert!(index.section(0.0).is_empty());
        let section = index.section(10.0);
        assert_eq!(section.loops.len(), 1);
        assert!((section.loops[0].area() - 100.0).abs() < 1e-6);
        assert!(index.section(10.5).is_empty());
    }

    #[test]
    fn test_open_surface_yields_polyline() {
        // A single vertical quad is an open surface.
        let mut mesh = TriangleMesh::new();
        mesh.vertices = vec![
            0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 0.0, 10.0, 0.0, 0.0, 10.0,
        ];
        mesh.indices = vec![0, 1, 2, 0, 2, 3];
        let section = SectionIndex::new(&mesh).section(5.0);
        assert!(section.loops.is_empty());
        assert_eq!(section.open.len(), 1);
        assert!((section.open[0].length() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_nesting_by_depth() {
        // Outer, hole, island inside the hole. Windings deliberately wrong.
        let mut outer = square(0.0, 10.0);
        outer.reverse();
        let hole = square(2.0, 8.0);
        let island = square(4.0, 6.0);

        let regions = nest_loops(vec![island, hole, outer], NestingOptions::default());
        assert_eq!(regions.len(), 2);
        assert!((regions[0].area() - 64.0).abs() < 1e-9);
        assert_eq!(regions[0].holes.len(), 1);
        assert!((regions[1].area() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_trust_winding() {
        let outer = square(0.0, 10.0);
        let mut hole = square(2.0, 8.0);
        hole.reverse();
        // A CCW loop inside the hole is still an outer when trusting winding.
        let island = square(4.0, 6.0);
        let options = NestingOptions {
            trust_winding: true,
            ..Default::default()
        };
        let regions = nest_loops(vec![outer, hole, island], options);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].holes.len(), 1);
    }

    #[test]
    fn test_overlapping_holes_merged() {
        let outer = square(0.0, 10.0);
        let mut a = Polygon::rectangle(Point2::new(2.0, 2.0), Point2::new(6.0, 6.0));
        let mut b = Polygon::rectangle(Point2::new(4.0, 4.0), Point2::new(8.0, 8.0));
        a.reverse();
        b.reverse();
        let options = NestingOptions {
            trust_winding: true,
            allow_overlapping_holes: false,
        };
        let regions = nest_loops(vec![outer.clone(), a.clone(), b.clone()], options);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].holes.len(), 1);
        assert!((regions[0].area() - (100.0 - 28.0)).abs() < 1e-6);

        let options = NestingOptions {
            trust_winding: true,
            allow_overlapping_holes: true,
        };
        let regions = nest_loops(vec![outer, a, b], options);
        assert_eq!(regions[0].holes.len(), 2);
    }
}
