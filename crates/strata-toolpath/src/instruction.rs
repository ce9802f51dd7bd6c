//! Machine instruction stream.
//!
//! Instructions are firmware-neutral: feeds are in mm/min, extrusion `e` is
//! the absolute accumulated filament length in mm. Axis, feed and extrusion
//! fields are `None` when duplicate suppression found them unchanged.

use serde::{Deserialize, Serialize};

/// A heater that can be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heater {
    /// Hot end.
    Nozzle,
    /// Heated bed.
    Bed,
}

/// One machine instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Non-depositing move.
    Travel {
        /// Target X.
        x: Option<f64>,
        /// Target Y.
        y: Option<f64>,
        /// Target Z.
        z: Option<f64>,
        /// Feed rate.
        feed: Option<f64>,
    },
    /// Depositing move.
    Extrude {
        /// Target X.
        x: Option<f64>,
        /// Target Y.
        y: Option<f64>,
        /// Target Z.
        z: Option<f64>,
        /// Feed rate.
        feed: Option<f64>,
        /// Accumulated extrusion at the target.
        e: Option<f64>,
    },
    /// Pull filament back by `length`.
    Retract {
        /// Filament length (mm).
        length: f64,
        /// Filament feed rate.
        feed: f64,
    },
    /// Push filament forward by `length` after a retraction.
    Unretract {
        /// Filament length (mm).
        length: f64,
        /// Filament feed rate.
        feed: f64,
    },
    /// Pause.
    Dwell {
        /// Duration.
        millis: u64,
    },
    /// Part-cooling fan, `0.0` (off) to `1.0` (full).
    Fan {
        /// Fan duty.
        speed: f64,
    },
    /// Set a heater, optionally waiting until it reaches `target`.
    Temperature {
        /// Heater to set.
        heater: Heater,
        /// Target temperature (°C).
        target: f64,
        /// Block until reached.
        wait: bool,
    },
    /// Free text.
    Comment {
        /// Comment text.
        text: String,
    },
}

impl Instruction {
    /// Comment instruction.
    pub fn comment(text: impl Into<String>) -> Self {
        Instruction::Comment { text: text.into() }
    }

    /// Is this a Travel or Extrude move?
    pub fn is_move(&self) -> bool {
        matches!(self, Instruction::Travel { .. } | Instruction::Extrude { .. })
    }
}
