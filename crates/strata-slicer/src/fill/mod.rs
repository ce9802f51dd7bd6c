//! Region fill strategies.
//!
//! Every strategy turns one region into [`CurveSet`]s of loops and open
//! curves tagged with a [`FillType`]; shells also report the area left
//! inside them.

mod lines;
mod shells;
mod tiled;

pub use lines::{LinesFill, LinesMode};
pub use shells::{ShellsFill, ShellsResult};
pub use tiled::TiledFill;

use serde::{Deserialize, Serialize};

use crate::path::{Polygon, Polyline};
use crate::region::Region;

/// What a deposited path is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillType {
    /// Outermost perimeter.
    OuterShell,
    /// Perimeters inside the outer one.
    InnerShell,
    /// Dense fill of roofs, floors and thin areas.
    SolidFill,
    /// Sparse interior fill.
    SparseInfill,
    /// Support structure.
    Support,
    /// Lines spanning unsupported gaps.
    Bridge,
    /// Open paths from open surfaces.
    OpenShellCurve,
}

impl FillType {
    /// Is this a perimeter?
    pub fn is_shell(self) -> bool {
        matches!(self, FillType::OuterShell | FillType::InnerShell)
    }
}

/// A closed loop to print.
#[derive(Debug, Clone, PartialEq)]
pub struct FillLoop {
    /// Loop geometry.
    pub polygon: Polygon,
    /// Fill type.
    pub fill: FillType,
}

/// An open curve to print.
#[derive(Debug, Clone, PartialEq)]
pub struct FillCurve {
    /// Curve geometry.
    pub polyline: Polyline,
    /// Fill type.
    pub fill: FillType,
}

/// Loops and curves produced together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveSet {
    /// Closed loops.
    pub loops: Vec<FillLoop>,
    /// Open curves.
    pub curves: Vec<FillCurve>,
}

impl CurveSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loops sharing one fill type.
    pub fn from_loops(polygons: impl IntoIterator<Item = Polygon>, fill: FillType) -> Self {
        Self {
            loops: polygons
                .into_iter()
                .map(|polygon| FillLoop { polygon, fill })
                .collect(),
            curves: Vec::new(),
        }
    }

    /// Curves sharing one fill type.
    pub fn from_curves(polylines: impl IntoIterator<Item = Polyline>, fill: FillType) -> Self {
        Self {
            loops: Vec::new(),
            curves: polylines
                .into_iter()
                .map(|polyline| FillCurve { polyline, fill })
                .collect(),
        }
    }

    /// Nothing to print?
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty() && self.curves.is_empty()
    }

    /// Move everything from `other` into this set.
    pub fn append(&mut self, mut other: CurveSet) {
        self.loops.append(&mut other.loops);
        self.curves.append(&mut other.curves);
    }

    /// Total path length, loops closed.
    pub fn length(&self) -> f64 {
        self.loops.iter().map(|l| l.polygon.perimeter()).sum::<f64>()
            + self.curves.iter().map(|c| c.polyline.length()).sum::<f64>()
    }
}

/// Output of a fill strategy.
#[derive(Debug, Clone, Default)]
pub struct FillOutput {
    /// Paths, in the order the strategy produced them.
    pub curve_sets: Vec<CurveSet>,
    /// Area left unfilled inside the paths (shells only).
    pub inner_regions: Vec<Region>,
}

/// The available fill strategies.
#[derive(Debug, Clone)]
pub enum RegionFill {
    /// Concentric perimeters.
    Shells(ShellsFill),
    /// Parallel lines threaded into long connected runs.
    ParallelLines(LinesFill),
    /// Unconnected parallel lines.
    Raster(LinesFill),
    /// Another strategy applied tile by tile.
    Tiled(TiledFill),
    /// Widely spaced infill lines.
    SparseLines(LinesFill),
    /// Widely spaced support lines.
    SupportLines(LinesFill),
    /// Lines across the narrow direction of the region.
    BridgeLines(LinesFill),
}

impl RegionFill {
    /// Fill `region`.
    pub fn compute(&self, region: &Region) -> FillOutput {
        let lines = |params: &LinesFill, mode: LinesMode| FillOutput {
            curve_sets: vec![params.compute(region, mode)],
            inner_regions: Vec::new(),
        };
        match self {
            RegionFill::Shells(shells) => {
                let result = shells.compute(region);
                FillOutput {
                    curve_sets: result.shells,
                    inner_regions: result.inner_regions,
                }
            }
            RegionFill::ParallelLines(p) => lines(p, LinesMode::Connected),
            RegionFill::Raster(p) => lines(p, LinesMode::Raster),
            RegionFill::SparseLines(p) => lines(p, LinesMode::Sparse),
            RegionFill::SupportLines(p) => lines(p, LinesMode::Support),
            RegionFill::BridgeLines(p) => lines(p, LinesMode::Bridge),
            RegionFill::Tiled(tiled) => FillOutput {
                curve_sets: tiled.compute(region),
                inner_regions: Vec::new(),
            },
        }
    }
}
