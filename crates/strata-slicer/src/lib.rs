#![warn(missing_docs)]

//! Layer-based toolpath planning for FFF printing.
//!
//! The pipeline slices tagged meshes into a stack of horizontal layers,
//! resolves each layer into disjoint regions, detects bridges and plans
//! support, fills regions with shells and line patterns, and schedules
//! everything into per-layer tool paths.
//!
//! # Example
//!
//! ```ignore
//! use strata_mesh::load_stl;
//! use strata_slicer::{PrintMesh, PrintPipeline, PrintSettings};
//!
//! let mesh = load_stl("part.stl")?;
//! let pipeline = PrintPipeline::new(PrintSettings::default(), vec![PrintMesh::solid(mesh)]);
//! for progress in pipeline {
//!     let progress = progress?;
//!     println!("{:?} {}/{}", progress.stage, progress.current, progress.total);
//! }
//! ```

pub mod clip;
mod contour;
pub mod driver;
pub mod error;
pub mod fill;
pub mod path;
pub mod pipeline;
pub mod postprocess;
pub mod region;
pub mod schedule;
pub mod settings;
pub mod slice;
pub mod stack;
pub mod support;

pub use contour::{nest_loops, NestingOptions};
pub use driver::{
    DefaultPrintStrategy, LayerPrintDriver, LayerShells, LayerToolpaths, PrintStrategy,
    RegionShells,
};
pub use error::{Result, SlicerError};
pub use fill::{
    CurveSet, FillCurve, FillLoop, FillOutput, FillType, LinesFill, LinesMode, RegionFill,
    ShellsFill, ShellsResult, TiledFill,
};
pub use path::{Polygon, Polyline};
pub use pipeline::{PrintPipeline, Progress, Stage};
pub use region::Region;
pub use schedule::{
    FeedPolicy, GroupScheduler, LayerPathBuilder, PathKind, PathScheduler, SequentialScheduler,
    SettingsFeedPolicy, SortingScheduler, SpeedHint, ToolPath,
};
pub use settings::{LayerRange, PrintSettings};
pub use slice::{ResolvedGeometry, Slice, SliceInputs};
pub use stack::{layer_heights, LayerStack, MeshRole, OpenPathMode, PrintMesh, SliceStackBuilder};
pub use support::{LayerSupport, SupportPlan, SupportPlanner};
