//! Per-layer path generation.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_math::Point3;
use tracing::{debug, info};

use crate::clip::{self, OffsetJoin, MIN_AREA};
use crate::error::{Result, SlicerError};
use crate::fill::{CurveSet, FillType, LinesFill, RegionFill, ShellsFill, TiledFill};
use crate::region::Region;
use crate::schedule::{
    FeedPolicy, GroupScheduler, LayerPathBuilder, PathKind, PathScheduler, SequentialScheduler,
    SettingsFeedPolicy, SpeedHint, ToolPath,
};
use crate::settings::PrintSettings;
use crate::stack::LayerStack;
use crate::support::SupportPlan;

/// Support islands get this many shells.
const SUPPORT_ISLAND_SHELLS: usize = 2;

/// Tool paths of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerToolpaths {
    /// Layer index.
    pub index: usize,
    /// Cutting height.
    pub z: f64,
    /// Layer thickness.
    pub height: f64,
    /// Paths in print order.
    pub paths: Vec<ToolPath>,
}

impl LayerToolpaths {
    /// Time spent depositing (seconds).
    pub fn deposition_time(&self) -> f64 {
        self.deposits().map(ToolPath::duration).sum()
    }

    /// Deposited length.
    pub fn deposition_length(&self) -> f64 {
        self.deposits().map(ToolPath::length).sum()
    }

    /// Travelled length.
    pub fn travel_length(&self) -> f64 {
        self.paths
            .iter()
            .filter(|p| p.kind == PathKind::Travel)
            .map(ToolPath::length)
            .sum()
    }

    /// Deposits of fill type `fill`.
    pub fn paths_of(&self, fill: FillType) -> impl Iterator<Item = &ToolPath> {
        self.deposits().filter(move |p| p.fill == Some(fill))
    }

    fn deposits(&self) -> impl Iterator<Item = &ToolPath> {
        self.paths.iter().filter(|p| p.kind == PathKind::Deposit)
    }
}

/// Supplies the scheduling policy used by [`LayerPrintDriver`].
pub trait PrintStrategy: Send + Sync {
    /// Feed selection.
    fn feed_policy(&self) -> Arc<dyn FeedPolicy>;

    /// Fresh scheduler for one layer.
    fn scheduler(&self) -> Box<dyn PathScheduler> {
        Box::new(SequentialScheduler::new(self.feed_policy()))
    }

    /// Speed hint for layer `index`.
    fn speed_hint(&self, index: usize) -> SpeedHint {
        if index == 0 {
            SpeedHint::Careful
        } else {
            SpeedHint::Rapid
        }
    }
}

/// Strategy whose feeds come from [`PrintSettings`].
pub struct DefaultPrintStrategy {
    feeds: Arc<dyn FeedPolicy>,
}

impl DefaultPrintStrategy {
    /// Read feeds from `settings`.
    pub fn new(settings: &PrintSettings) -> Self {
        Self {
            feeds: Arc::new(SettingsFeedPolicy::new(settings)),
        }
    }
}

impl PrintStrategy for DefaultPrintStrategy {
    fn feed_policy(&self) -> Arc<dyn FeedPolicy> {
        Arc::clone(&self.feeds)
    }
}

/// Shells of one solid region.
#[derive(Debug, Clone)]
pub struct RegionShells {
    /// The solid region.
    pub region: Region,
    /// Shell loops, outermost first.
    pub shells: Vec<CurveSet>,
    /// Area inside the shells.
    pub inner: Vec<Region>,
}

/// Shells of one layer.
#[derive(Debug, Clone, Default)]
pub struct LayerShells {
    /// Per solid region.
    pub regions: Vec<RegionShells>,
    /// Union of the inner areas.
    pub interior: Vec<Region>,
}

/// Generates the tool paths of each layer from a resolved stack and its
/// support plan.
pub struct LayerPrintDriver {
    settings: PrintSettings,
    stack: LayerStack,
    plan: SupportPlan,
    strategy: Arc<dyn PrintStrategy>,
    shells: Vec<LayerShells>,
    position: Point3,
}

impl LayerPrintDriver {
    /// Create a driver. The stack must be resolved.
    pub fn new(
        settings: PrintSettings,
        stack: LayerStack,
        plan: SupportPlan,
        strategy: Arc<dyn PrintStrategy>,
    ) -> Result<Self> {
        stack.require_resolved()?;
        if plan.len() != stack.len() {
            return Err(SlicerError::InvalidSettings(format!(
                "support plan covers {} layers, stack has {}",
                plan.len(),
                stack.len()
            )));
        }
        Ok(Self {
            settings,
            stack,
            plan,
            strategy,
            shells: Vec::new(),
            position: Point3::origin(),
        })
    }

    /// The layer stack.
    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// The support plan.
    pub fn plan(&self) -> &SupportPlan {
        &self.plan
    }

    /// Number of layers in the stack.
    pub fn layer_count(&self) -> usize {
        self.stack.len()
    }

    /// Indices of the layers to print.
    pub fn layers_to_print(&self) -> Vec<usize> {
        (0..self.stack.len())
            .filter(|&i| self.settings.layer_range.map_or(true, |r| r.contains(i)))
            .collect()
    }

    /// Have the shells been computed?
    pub fn has_shells(&self) -> bool {
        self.shells.len() == self.stack.len()
    }

    /// Compute every layer's shells in parallel. Roof and floor detection
    /// look at neighboring layers' shells, so they are computed up front.
    pub fn precompute_shells(&mut self) {
        let fill = ShellsFill {
            filter_self_overlaps: self.settings.filter_self_overlaps,
            ..ShellsFill::new(
                self.settings.path_width(),
                self.settings.shell_spacing(),
                self.settings.shell_count,
            )
        };
        self.shells = self
            .stack
            .slices()
            .par_iter()
            .map(|slice| {
                let regions: Vec<RegionShells> = slice
                    .solids()
                    .iter()
                    .map(|region| {
                        let result = fill.compute(region);
                        RegionShells {
                            region: region.clone(),
                            shells: result.shells,
                            inner: result.inner_regions,
                        }
                    })
                    .collect();
                let interior = clip::union_all(
                    &regions.iter().flat_map(|r| r.inner.iter().cloned()).collect::<Vec<_>>(),
                );
                LayerShells { regions, interior }
            })
            .collect();
        debug!(layers = self.shells.len(), "shells computed");
    }

    /// Generate every selected layer.
    pub fn print_all(&mut self) -> Result<Vec<LayerToolpaths>> {
        let indices = self.layers_to_print();
        let layers = indices
            .into_iter()
            .map(|i| self.print_layer(i))
            .collect::<Result<Vec<_>>>()?;
        info!(layers = layers.len(), "layers printed");
        Ok(layers)
    }

    /// Generate the paths of layer `index`.
    pub fn print_layer(&mut self, index: usize) -> Result<LayerToolpaths> {
        if !self.has_shells() {
            self.precompute_shells();
        }
        let slice = self
            .stack
            .get(index)
            .ok_or_else(|| SlicerError::InvalidSettings(format!("no layer {index}")))?;
        let s = &self.settings;

        let mut builder = LayerPathBuilder::new(self.position, s.travel_feed);
        builder.append_z_change(slice.z, s.z_feed);

        let mut scheduler = GroupScheduler::new(self.strategy.scheduler());
        scheduler.set_speed_hint(self.strategy.speed_hint(index));

        let (solid_zone, sparse_zone) = self.solid_and_sparse_zones(index);
        let bridges = self.plan.bridges(index);
        let angle = s.infill_angle(index);
        let width = s.path_width();

        let mut remaining: Vec<&RegionShells> = self.shells[index].regions.iter().collect();
        while !remaining.is_empty() {
            let here = builder.position_2d();
            let next = remaining
                .iter()
                .enumerate()
                .map(|(i, r)| (i, r.region.boundary_distance(&here)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(i, _)| i);
            let region = remaining.swap_remove(next);

            for shell in &region.shells {
                scheduler.append_group(vec![shell.clone()], &mut builder)?;
            }
            if region.inner.is_empty() {
                continue;
            }

            let mut solid = clip::intersection(&region.inner, &solid_zone);
            let mut sparse = clip::intersection(&region.inner, &sparse_zone);

            if !bridges.is_empty() {
                let bridge = clip::remove_small(clip::intersection(&region.inner, bridges), MIN_AREA);
                if !bridge.is_empty() {
                    solid = clip::difference(&solid, &bridge);
                    sparse = clip::difference(&sparse, &bridge);
                    let fill = RegionFill::BridgeLines(LinesFill::new(
                        width,
                        s.solid_fill_spacing(),
                        angle,
                        FillType::Bridge,
                    ));
                    scheduler.append_group(fill_all(&fill, &bridge), &mut builder)?;
                }
            }

            let solid = clip::remove_small(solid, MIN_AREA);
            if !solid.is_empty() {
                let sets = self.solid_fill(&solid, &sparse, angle);
                scheduler.append_group(sets, &mut builder)?;
            }

            let sparse = clip::remove_small(sparse, MIN_AREA);
            if !sparse.is_empty() {
                let lines = RegionFill::SparseLines(LinesFill::new(
                    width,
                    s.sparse_fill_spacing(),
                    angle,
                    FillType::SparseInfill,
                ));
                let sets = sparse
                    .iter()
                    .flat_map(|r| {
                        let (min, max) = r.bounds();
                        let large = (max.x - min.x).max(max.y - min.y) > s.infill_tile_size;
                        if large && s.infill_tile_size > 0.0 {
                            TiledFill::new(s.infill_tile_size, lines.clone()).compute(r)
                        } else {
                            lines.compute(r).curve_sets
                        }
                    })
                    .collect();
                scheduler.append_group(sets, &mut builder)?;
            }
        }

        let support = self.plan.support(index);
        if !support.is_empty() {
            let sets = self.support_fill(support);
            scheduler.append_group(sets, &mut builder)?;
        }

        if !slice.paths().is_empty() {
            let set = CurveSet::from_curves(slice.paths().iter().cloned(), FillType::OpenShellCurve);
            scheduler.append_group(vec![set], &mut builder)?;
        }

        self.position = builder.position();
        Ok(LayerToolpaths {
            index,
            z: slice.z,
            height: slice.height,
            paths: builder.into_paths(),
        })
    }

    /// Split the layer interior into areas that must be solid (roofs and
    /// floors) and areas that may be sparse.
    fn solid_and_sparse_zones(&self, index: usize) -> (Vec<Region>, Vec<Region>) {
        let interior = &self.shells[index].interior;
        if interior.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let s = &self.settings;

        let exposed = |layers: usize, neighbor: &dyn Fn(usize) -> Option<usize>| -> Vec<Region> {
            if layers == 0 {
                return Vec::new();
            }
            let mut covered: Option<Vec<Region>> = None;
            for k in 1..=layers {
                let other = match neighbor(k) {
                    Some(j) => &self.shells[j].interior,
                    None => return interior.clone(),
                };
                covered = Some(match covered {
                    None => other.clone(),
                    Some(c) => clip::intersection(&c, other),
                });
            }
            clip::difference(interior, &covered.unwrap_or_default())
        };

        let n = self.shells.len();
        let roof = exposed(s.roof_layers, &|k| (index + k < n).then_some(index + k));
        let floor = exposed(s.floor_layers, &|k| index.checked_sub(k));

        let solid = clip::remove_small(clip::union(&roof, &floor), MIN_AREA);
        let sparse = if solid.is_empty() {
            interior.clone()
        } else {
            clip::difference(interior, &solid)
        };
        (solid, sparse)
    }

    fn solid_fill(&self, solid: &[Region], sparse: &[Region], angle: f64) -> Vec<CurveSet> {
        let s = &self.settings;
        let lines = RegionFill::ParallelLines(LinesFill::new(
            s.path_width(),
            s.solid_fill_spacing(),
            angle,
            FillType::SolidFill,
        ));
        let mut sets = Vec::new();
        for region in solid {
            let borders_sparse = s.interior_solid_shells > 0
                && !sparse.is_empty()
                && !clip::intersection(
                    &clip::grow(std::slice::from_ref(region), s.path_width(), OffsetJoin::Miter),
                    sparse,
                )
                .is_empty();
            if borders_sparse {
                let shells = ShellsFill {
                    outer_fill: FillType::InnerShell,
                    ..ShellsFill::new(s.path_width(), s.shell_spacing(), s.interior_solid_shells)
                }
                .compute(region);
                sets.extend(shells.shells);
                sets.extend(fill_all(&lines, &shells.inner_regions));
            } else {
                sets.extend(lines.compute(region).curve_sets);
            }
        }
        sets
    }

    fn support_fill(&self, support: &[Region]) -> Vec<CurveSet> {
        let s = &self.settings;
        let island = RegionFill::Shells(ShellsFill {
            outer_fill: FillType::Support,
            inner_fill: FillType::Support,
            ..ShellsFill::new(s.path_width(), s.shell_spacing(), SUPPORT_ISLAND_SHELLS)
        });
        let lines = RegionFill::SupportLines(LinesFill::new(
            s.path_width(),
            s.support_spacing(),
            0.0,
            FillType::Support,
        ));
        support
            .iter()
            .flat_map(|r| {
                if r.area() < s.support_small_island_area {
                    island.compute(r).curve_sets
                } else {
                    lines.compute(r).curve_sets
                }
            })
            .collect()
    }
}

fn fill_all(fill: &RegionFill, regions: &[Region]) -> Vec<CurveSet> {
    regions
        .iter()
        .flat_map(|r| fill.compute(r).curve_sets)
        .collect()
}
