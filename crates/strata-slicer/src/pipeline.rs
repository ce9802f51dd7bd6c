//! Incremental slicing pipeline.
//!
//! [`PrintPipeline`] is an iterator: each call to `next` runs one step and
//! reports progress. Printing advances one layer per step, so a caller can
//! stop at any point simply by no longer pulling.

use std::iter::FusedIterator;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::driver::{DefaultPrintStrategy, LayerPrintDriver, LayerToolpaths, PrintStrategy};
use crate::error::Result;
use crate::postprocess::postprocess;
use crate::region::Region;
use crate::settings::PrintSettings;
use crate::stack::{LayerStack, PrintMesh, SliceStackBuilder};
use crate::support::{SupportPlan, SupportPlanner};

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Cutting meshes into slices.
    Slicing,
    /// Resolving slice geometry.
    Resolving,
    /// Detecting bridges.
    Bridging,
    /// Planning support.
    Support,
    /// Computing perimeter shells.
    Shells,
    /// Generating layer paths.
    Printing,
    /// Final passes over the layers.
    PostProcessing,
}

/// Progress report from one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Stage that just ran.
    pub stage: Stage,
    /// Units of work done in this stage.
    pub current: usize,
    /// Units of work in this stage.
    pub total: usize,
}

impl Progress {
    fn done(stage: Stage, total: usize) -> Self {
        Self {
            stage,
            current: total,
            total,
        }
    }
}

enum State {
    Slice,
    Resolve(LayerStack),
    Bridge(LayerStack),
    Support(LayerStack, Vec<Vec<Region>>),
    Shells(LayerPrintDriver),
    Print(LayerPrintDriver, Vec<usize>, usize),
    PostProcess(LayerPrintDriver),
    Done,
}

/// Runs slicing, resolution, support planning, path generation and
/// post-processing one step at a time.
pub struct PrintPipeline {
    settings: PrintSettings,
    meshes: Vec<PrintMesh>,
    strategy: Arc<dyn PrintStrategy>,
    state: State,
    layers: Vec<LayerToolpaths>,
}

impl PrintPipeline {
    /// Pipeline with the default strategy.
    pub fn new(settings: PrintSettings, meshes: Vec<PrintMesh>) -> Self {
        let strategy = Arc::new(DefaultPrintStrategy::new(&settings));
        Self::with_strategy(settings, meshes, strategy)
    }

    /// Pipeline with a custom scheduling strategy.
    pub fn with_strategy(
        settings: PrintSettings,
        meshes: Vec<PrintMesh>,
        strategy: Arc<dyn PrintStrategy>,
    ) -> Self {
        Self {
            settings,
            meshes,
            strategy,
            state: State::Slice,
            layers: Vec::new(),
        }
    }

    /// Layers generated so far.
    pub fn layers(&self) -> &[LayerToolpaths] {
        &self.layers
    }

    /// Has the pipeline finished or failed?
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Take the generated layers, complete or not.
    pub fn into_output(self) -> Vec<LayerToolpaths> {
        self.layers
    }

    /// Run to completion.
    pub fn run(mut self) -> Result<Vec<LayerToolpaths>> {
        for progress in &mut self {
            progress?;
        }
        Ok(self.layers)
    }

    fn step(&mut self) -> Result<Option<Progress>> {
        let state = std::mem::replace(&mut self.state, State::Done);
        let progress = match state {
            State::Done => return Ok(None),
            State::Slice => {
                let builder = SliceStackBuilder::new(self.settings.clone());
                let stack = builder.build(&self.meshes)?;
                let total = builder.completed();
                info!(layers = stack.len(), "sliced");
                self.state = State::Resolve(stack);
                Progress::done(Stage::Slicing, total)
            }
            State::Resolve(mut stack) => {
                stack.resolve_all(self.settings.open_path_width)?;
                let total = stack.len();
                self.state = State::Bridge(stack);
                Progress::done(Stage::Resolving, total)
            }
            State::Bridge(stack) => {
                let bridges = if self.settings.enable_bridging {
                    SupportPlanner::new(&self.settings).compute_bridges(&stack)?
                } else {
                    vec![Vec::new(); stack.len()]
                };
                let total = stack.len();
                self.state = State::Support(stack, bridges);
                Progress::done(Stage::Bridging, total)
            }
            State::Support(stack, bridges) => {
                let support = if self.settings.generate_support {
                    SupportPlanner::new(&self.settings).compute_support(&stack, &bridges)?
                } else {
                    vec![Vec::new(); stack.len()]
                };
                let total = stack.len();
                let plan = SupportPlan::new(bridges, support);
                let driver = LayerPrintDriver::new(
                    self.settings.clone(),
                    stack,
                    plan,
                    Arc::clone(&self.strategy),
                )?;
                self.state = State::Shells(driver);
                Progress::done(Stage::Support, total)
            }
            State::Shells(mut driver) => {
                driver.precompute_shells();
                let total = driver.layer_count();
                let indices = driver.layers_to_print();
                self.state = State::Print(driver, indices, 0);
                Progress::done(Stage::Shells, total)
            }
            State::Print(mut driver, indices, cursor) => match indices.get(cursor) {
                Some(&index) => {
                    let layer = driver.print_layer(index)?;
                    self.layers.push(layer);
                    let total = indices.len();
                    self.state = State::Print(driver, indices, cursor + 1);
                    Progress {
                        stage: Stage::Printing,
                        current: cursor + 1,
                        total,
                    }
                }
                None => {
                    self.state = State::PostProcess(driver);
                    return self.step();
                }
            },
            State::PostProcess(driver) => {
                postprocess(&mut self.layers, driver.plan(), &self.settings);
                info!(layers = self.layers.len(), "toolpaths complete");
                Progress::done(Stage::PostProcessing, self.layers.len())
            }
        };
        Ok(Some(progress))
    }
}

impl Iterator for PrintPipeline {
    type Item = Result<Progress>;

    fn next(&mut self) -> Option<Self::Item> {
        // A failed step leaves the state at `Done`.
        self.step().transpose()
    }
}

impl FusedIterator for PrintPipeline {}
