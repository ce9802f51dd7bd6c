//! Bridge detection and support region planning.

use rayon::prelude::*;
use strata_math::{cross2, opening_angle_deg};
use tracing::{debug, info};

use crate::clip::{self, OffsetJoin, MIN_AREA};
use crate::error::Result;
use crate::region::{distance_to_regions, Region};
use crate::settings::PrintSettings;
use crate::stack::LayerStack;

/// A bridge collapses when shrunk by this fraction of the maximum width.
const BRIDGE_COLLAPSE_FRACTION: f64 = 0.55;
/// Convex corners sharper than this must rest on the layer below.
const BRIDGE_SHARP_ANGLE: f64 = 120.0;
/// How close a sharp corner must be to the layer below (mm).
const BRIDGE_ANCHOR_TOLERANCE: f64 = 0.25;
/// Floating regions smaller than this are ignored (mm²).
const MIN_BRIDGE_AREA: f64 = 0.1;

/// Bridge and support geometry for one layer.
#[derive(Debug, Clone, Default)]
pub struct LayerSupport {
    /// Regions printed as bridges on this layer.
    pub bridges: Vec<Region>,
    /// Support regions printed on this layer.
    pub support: Vec<Region>,
}

/// Bridge and support geometry for the whole stack.
#[derive(Debug, Clone, Default)]
pub struct SupportPlan {
    layers: Vec<LayerSupport>,
}

impl SupportPlan {
    /// Plan with nothing in it for `layers` layers.
    pub fn empty(layers: usize) -> Self {
        Self {
            layers: vec![LayerSupport::default(); layers],
        }
    }

    /// Assemble a plan from per-layer bridges and support.
    pub fn new(bridges: Vec<Vec<Region>>, support: Vec<Vec<Region>>) -> Self {
        Self {
            layers: bridges
                .into_iter()
                .zip(support)
                .map(|(bridges, support)| LayerSupport { bridges, support })
                .collect(),
        }
    }

    /// Bridges printed on layer `index`.
    pub fn bridges(&self, index: usize) -> &[Region] {
        self.layers.get(index).map_or(&[], |l| &l.bridges)
    }

    /// Support printed on layer `index`.
    pub fn support(&self, index: usize) -> &[Region] {
        self.layers.get(index).map_or(&[], |l| &l.support)
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Is the plan empty?
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Computes bridges and support regions from a resolved stack.
pub struct SupportPlanner<'a> {
    settings: &'a PrintSettings,
}

impl<'a> SupportPlanner<'a> {
    /// Create a planner.
    pub fn new(settings: &'a PrintSettings) -> Self {
        Self { settings }
    }

    /// Compute bridges and, when enabled, support.
    pub fn plan(&self, stack: &LayerStack) -> Result<SupportPlan> {
        let bridges = if self.settings.enable_bridging {
            self.compute_bridges(stack)?
        } else {
            vec![Vec::new(); stack.len()]
        };
        let support = if self.settings.generate_support {
            self.compute_support(stack, &bridges)?
        } else {
            vec![Vec::new(); stack.len()]
        };

        Ok(SupportPlan::new(bridges, support))
    }

    /// Bridge regions per layer: parts of a layer hanging over nothing that
    /// are narrow enough to span and whose sharp corners rest on the layer
    /// below. Entry `i` holds the bridges printed on layer `i`.
    pub fn compute_bridges(&self, stack: &LayerStack) -> Result<Vec<Vec<Region>>> {
        stack.require_resolved()?;
        let slices = stack.slices();

        let bridges: Vec<Vec<Region>> = (0..slices.len())
            .into_par_iter()
            .map(|i| {
                if i == 0 {
                    return Vec::new();
                }
                self.bridge_regions(slices[i - 1].solids(), slices[i].solids())
            })
            .collect();

        let count: usize = bridges.iter().map(Vec::len).sum();
        debug!(count, "bridges detected");
        Ok(bridges)
    }

    fn bridge_regions(&self, below: &[Region], layer: &[Region]) -> Vec<Region> {
        if below.is_empty() || layer.is_empty() {
            return Vec::new();
        }
        let floating = clip::remove_small(clip::difference(layer, below), MIN_BRIDGE_AREA);
        floating
            .into_iter()
            .filter(|r| self.is_bridgeable(r, below))
            .collect()
    }

    fn is_bridgeable(&self, region: &Region, below: &[Region]) -> bool {
        let collapse = BRIDGE_COLLAPSE_FRACTION * self.settings.max_bridge_width;
        if !clip::shrink(std::slice::from_ref(region), collapse, OffsetJoin::Miter).is_empty() {
            return false;
        }

        region.loops().all(|l| {
            let n = l.len();
            (0..n).all(|k| {
                let a = l.points[(k + n - 1) % n];
                let b = l.points[k];
                let c = l.points[(k + 1) % n];
                // Region interior is on the left of every loop.
                let convex = cross2(&(b - a), &(c - b)) > 0.0;
                let sharp = convex && opening_angle_deg(&a, &b, &c) < BRIDGE_SHARP_ANGLE;
                !sharp || distance_to_regions(&b, below) <= BRIDGE_ANCHOR_TOLERANCE
            })
        })
    }

    /// Support regions per layer.
    ///
    /// A first parallel pass finds, for every layer, the area of the layer
    /// above that overhangs this one by more than the overhang distance and
    /// is not a bridge. Small isolated overhangs and support points become
    /// dots. A second, top-down pass accumulates support downward, merges
    /// near-misses with a closing, and keeps everything clear of the solids
    /// by the support gap.
    pub fn compute_support(
        &self,
        stack: &LayerStack,
        bridges: &[Vec<Region>],
    ) -> Result<Vec<Vec<Region>>> {
        stack.require_resolved()?;
        let slices = stack.slices();
        let n = slices.len();
        let s = self.settings;

        let overhang = s.overhang_distance().min(s.max_bridge_width * 10.0);
        let dot_area = std::f64::consts::PI * (s.support_point_diameter / 2.0).powi(2);

        let needed: Vec<Vec<Region>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let solids = slices[i].solids();
                let mut support = Vec::new();

                if let Some(above) = slices.get(i + 1).map(|sl| sl.solids()) {
                    if !above.is_empty() {
                        let raw = clip::difference(above, &clip::grow(solids, overhang, OffsetJoin::Round));
                        let raw = match bridges.get(i + 1) {
                            Some(b) if !b.is_empty() => clip::difference(&raw, b),
                            _ => raw,
                        };
                        for region in clip::remove_small(raw, MIN_AREA) {
                            let center = region.outer.centroid();
                            let isolated =
                                distance_to_regions(&center, solids) > s.support_point_diameter;
                            if region.area() < dot_area && isolated {
                                support.push(clip::dot(center, s.support_point_diameter));
                            } else {
                                support.push(region);
                            }
                        }
                    }
                }

                support.extend(
                    slices[i]
                        .support_points()
                        .iter()
                        .map(|p| clip::dot(*p, s.support_point_diameter)),
                );
                support
            })
            .collect();

        let mut result = vec![Vec::new(); n];
        let mut carried: Vec<Region> = Vec::new();
        for i in (0..n).rev() {
            let solids = slices[i].solids();
            let combined = clip::union(&needed[i], &carried);
            let merged = if s.support_merge_distance > 0.0 {
                clip::closing(&combined, s.support_merge_distance)
            } else {
                combined
            };
            let merged = clip::simplify(&merged, s.support_simplify_tolerance);

            let keep_out = clip::grow(solids, s.support_gap, OffsetJoin::Round);
            let generated = clip::remove_small(clip::difference(&merged, &keep_out), MIN_AREA);

            let explicit = slices[i].support_solids();
            result[i] = if explicit.is_empty() {
                generated.clone()
            } else {
                let all = clip::union(&generated, explicit);
                clip::remove_small(clip::difference(&all, &keep_out), MIN_AREA)
            };
            carried = generated;
        }

        let layers = result.iter().filter(|r| !r.is_empty()).count();
        info!(layers, "support planned");
        Ok(result)
    }
}
