//! Whole-job lowering: start sequence, layers, end sequence.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use strata_math::Point3;
use strata_slicer::{FillType, LayerToolpaths, PathKind, PrintSettings, ToolPath};
use tracing::{debug, info};

use crate::assembler::{AssemblerOptions, ToolpathAssembler};
use crate::error::Result;
use crate::instruction::{Heater, Instruction};
use crate::printer::PrinterProfile;

/// Job-level options layered on top of a [`PrinterProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Nozzle temperature; the profile default when unset.
    pub print_temperature: Option<f64>,
    /// Bed temperature; the profile default when unset.
    pub bed_temperature: Option<f64>,
    /// Fan duty once cooling starts.
    pub fan_speed: f64,
    /// First layer index printed with the fan on.
    pub fan_start_layer: usize,
    /// Retract on travels longer than the profile's minimum.
    pub retract: bool,
    /// Deposits shorter than this are merged (mm).
    pub min_extrude_step: f64,
    /// Duplicate-suppression epsilon; `None` emits every field.
    pub dedup_epsilon: Option<f64>,
    /// Reject moves outside the build volume.
    pub check_bounds: bool,
    /// Lift above the last layer when parking (mm).
    pub park_lift: f64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            print_temperature: None,
            bed_temperature: None,
            fan_speed: 1.0,
            fan_start_layer: 2,
            retract: true,
            min_extrude_step: 0.05,
            dedup_epsilon: Some(1e-4),
            check_bounds: true,
            park_lift: 10.0,
        }
    }
}

/// Lowers per-layer tool paths into a complete instruction stream.
#[derive(Debug, Clone)]
pub struct JobAssembler {
    profile: PrinterProfile,
    job: JobSettings,
    path_width: f64,
    open_path_width: f64,
    filament_area: f64,
    travel_feed: f64,
}

impl JobAssembler {
    /// Assembler for `profile`. Path widths come from `print`, scaled to the
    /// profile's nozzle; the filament diameter is the profile's.
    pub fn new(profile: PrinterProfile, job: JobSettings, print: &PrintSettings) -> Self {
        let print = profile.print_settings(print);
        let path_width = print.path_width();
        let radius = profile.filament_diameter / 2.0;
        Self {
            path_width,
            open_path_width: print.open_path_width.unwrap_or(path_width),
            filament_area: PI * radius * radius,
            travel_feed: print.travel_feed.min(profile.max_feed_xy),
            profile,
            job,
        }
    }

    /// Printer profile in use.
    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    /// Filament consumed per mm of deposit of `width` at `layer_height`.
    pub fn extrusion_rate(&self, width: f64, layer_height: f64) -> f64 {
        if self.filament_area <= 0.0 {
            return 0.0;
        }
        width * layer_height / self.filament_area
    }

    /// Lower `layers` in order.
    pub fn assemble(&self, layers: &[LayerToolpaths]) -> Result<Vec<Instruction>> {
        let mut asm = ToolpathAssembler::new(AssemblerOptions {
            min_extrude_step: self.job.min_extrude_step,
            dedup_epsilon: self.job.dedup_epsilon,
            volume: self.job.check_bounds.then_some(self.profile.volume),
        });

        self.start(&mut asm, layers.len())?;
        let mut fan_on = false;
        for layer in layers {
            asm.comment(format!("layer {} z={:.3}", layer.index, layer.z))?;
            if !fan_on && layer.index >= self.job.fan_start_layer {
                asm.fan(self.job.fan_speed)?;
                fan_on = true;
            }
            for path in &layer.paths {
                self.lower_path(&mut asm, path, layer.height)?;
            }
            debug!(layer = layer.index, instructions = asm.instructions().len(), "layer lowered");
        }
        self.end(&mut asm)?;

        let out = asm.finish()?;
        info!(instructions = out.len(), layers = layers.len(), "job assembled");
        Ok(out)
    }

    fn start(&self, asm: &mut ToolpathAssembler, layer_count: usize) -> Result<()> {
        let nozzle = self.job.print_temperature.unwrap_or(self.profile.print_temperature);
        let bed = self.job.bed_temperature.unwrap_or(self.profile.bed_temperature);

        asm.comment(format!("printer: {}", self.profile.name))?;
        asm.comment(format!("layers: {layer_count}"))?;
        if self.profile.heated_bed {
            asm.temperature(Heater::Bed, bed, false)?;
        }
        asm.temperature(Heater::Nozzle, nozzle, false)?;
        if self.profile.heated_bed {
            asm.temperature(Heater::Bed, bed, true)?;
        }
        asm.temperature(Heater::Nozzle, nozzle, true)?;
        asm.fan(0.0)
    }

    fn end(&self, asm: &mut ToolpathAssembler) -> Result<()> {
        asm.comment("end")?;
        if !asm.is_retracted() {
            let r = self.profile.retraction;
            asm.begin_retract(r.distance, r.feed)?;
        }
        let z = (asm.position().z + self.job.park_lift).min(self.profile.volume.z);
        asm.change_plane(z, self.profile.max_feed_z)?;
        asm.fan(0.0)?;
        asm.temperature(Heater::Nozzle, 0.0, false)?;
        if self.profile.heated_bed {
            asm.temperature(Heater::Bed, 0.0, false)?;
        }
        Ok(())
    }

    fn lower_path(&self, asm: &mut ToolpathAssembler, path: &ToolPath, layer_height: f64) -> Result<()> {
        match path.kind {
            PathKind::Travel | PathKind::PlaneChange => {
                let Some(&to) = path.points.last() else {
                    return Ok(());
                };
                let limit = if path.kind == PathKind::PlaneChange {
                    self.profile.max_feed_z
                } else {
                    self.profile.max_feed_xy
                };
                self.travel(asm, to, path.feed.min(limit))
            }
            PathKind::Deposit => {
                let Some((first, rest)) = path.points.split_first() else {
                    return Ok(());
                };
                if (*first - asm.pending_position()).norm() > 1e-6 {
                    self.travel(asm, *first, self.travel_feed)?;
                }
                if asm.is_retracted() {
                    asm.end_retract()?;
                }
                let width = match path.fill {
                    Some(FillType::OpenShellCurve) => self.open_path_width,
                    _ => self.path_width,
                };
                let rate = self.extrusion_rate(width, layer_height);
                let feed = path.feed.min(self.profile.max_feed_xy);
                for p in rest {
                    asm.extrude_to(*p, feed, rate)?;
                }
                Ok(())
            }
        }
    }

    fn travel(&self, asm: &mut ToolpathAssembler, to: Point3, feed: f64) -> Result<()> {
        let from = asm.pending_position();
        let distance = (to.xy() - from.xy()).norm();
        let r = self.profile.retraction;
        if self.job.retract && distance > r.min_travel && !asm.is_retracted() {
            asm.begin_retract(r.distance, r.feed)?;
        }
        asm.begin_travel()?;
        asm.travel_to(to, feed)?;
        asm.end_travel()
    }
}
