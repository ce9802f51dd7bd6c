//! Print-time estimation from an instruction stream.
//!
//! Moves are timed at their commanded feed with no acceleration model, so the
//! estimate is a lower bound.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_math::Point3;

use crate::instruction::Instruction;

/// Totals for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintEstimate {
    /// Machine time (s).
    pub seconds: f64,
    /// Deposited path length (mm).
    pub extrude_mm: f64,
    /// Travelled path length (mm).
    pub travel_mm: f64,
    /// Filament consumed (mm).
    pub filament_mm: f64,
    /// Distinct heights at which material was deposited.
    pub layer_count: usize,
}

impl fmt::Display for PrintEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.seconds.round() as u64;
        write!(
            f,
            "{}h{:02}m{:02}s, {} layers, {:.1} mm extruded, {:.1} mm travel, {:.1} mm filament",
            total / 3600,
            (total / 60) % 60,
            total % 60,
            self.layer_count,
            self.extrude_mm,
            self.travel_mm,
            self.filament_mm
        )
    }
}

fn timed(length: f64, feed: f64) -> f64 {
    if feed > 0.0 {
        length / (feed / 60.0)
    } else {
        0.0
    }
}

/// Walk `instructions` and total time, distances and filament.
///
/// Omitted axis, feed and extrusion fields keep their previous values.
pub fn estimate(instructions: &[Instruction]) -> PrintEstimate {
    let mut est = PrintEstimate::default();
    let mut position = Point3::origin();
    let mut feed = 0.0;
    let mut e = 0.0;
    let mut top: Option<f64> = None;

    for instruction in instructions {
        match instruction {
            Instruction::Travel {
                x,
                y,
                z,
                feed: f,
            } => {
                feed = f.unwrap_or(feed);
                let to = Point3::new(x.unwrap_or(position.x), y.unwrap_or(position.y), z.unwrap_or(position.z));
                let length = (to - position).norm();
                est.travel_mm += length;
                est.seconds += timed(length, feed);
                position = to;
            }
            Instruction::Extrude {
                x,
                y,
                z,
                feed: f,
                e: extruded,
            } => {
                feed = f.unwrap_or(feed);
                let to = Point3::new(x.unwrap_or(position.x), y.unwrap_or(position.y), z.unwrap_or(position.z));
                let length = (to - position).norm();
                est.extrude_mm += length;
                est.seconds += timed(length, feed);
                if let Some(next) = extruded {
                    est.filament_mm += (next - e).max(0.0);
                    e = *next;
                }
                if top.map_or(true, |t| to.z > t + 1e-6) {
                    top = Some(to.z);
                    est.layer_count += 1;
                }
                position = to;
            }
            Instruction::Retract { length, feed } | Instruction::Unretract { length, feed } => {
                est.seconds += timed(*length, *feed);
            }
            Instruction::Dwell { millis } => est.seconds += *millis as f64 / 1000.0,
            Instruction::Fan { .. } | Instruction::Temperature { .. } | Instruction::Comment { .. } => {}
        }
    }
    est
}
