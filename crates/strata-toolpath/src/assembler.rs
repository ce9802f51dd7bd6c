//! Stateful lowering of tool motion into [`Instruction`]s.
//!
//! The assembler owns the machine position, feed, accumulated extrusion and
//! the travel/retract brackets. Travel and retraction are bracketed
//! (`begin_*` / `end_*`) and neither bracket may nest.
//!
//! Fine deposition is decimated: a deposit shorter than the minimum step is
//! queued instead of emitted. When the queued arc length reaches the step, one
//! point is emitted at exactly that arc length along the last queued segment
//! and the rest of that segment is submitted again, so no length is lost.
//! Retraction, a Z change, any non-deposit instruction or an explicit
//! [`flush`](ToolpathAssembler::flush) drains the queue.
//!
//! Moves merged into the queue are collinear by contract, so the queue keeps
//! only its end point, arc length and point count. A run of `n` short moves
//! totalling `L` therefore emits `floor(L / step)` interpolated points plus one
//! flushed end point, however short the individual moves are.

use serde::{Deserialize, Serialize};
use strata_math::{lerp3, Point3};
use tracing::trace;

use crate::error::{Result, ToolpathError};
use crate::instruction::{Heater, Instruction};
use crate::printer::BuildVolume;

/// Lengths at or below this are treated as zero.
const LENGTH_EPSILON: f64 = 1e-9;

/// Merged deposit waiting to be emitted.
#[derive(Debug, Clone, Copy)]
struct Pending {
    to: Point3,
    arc: f64,
    points: usize,
}

/// Assembler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssemblerOptions {
    /// Deposits shorter than this are queued (mm). Zero disables queueing.
    pub min_extrude_step: f64,
    /// Omit axis, feed and extrusion values within this distance of the
    /// previously emitted value.
    pub dedup_epsilon: Option<f64>,
    /// Reject moves outside this volume.
    pub volume: Option<BuildVolume>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            min_extrude_step: 0.0,
            dedup_epsilon: None,
            volume: None,
        }
    }
}

/// Coarse assembler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Nothing emitted yet, or the last move was not a deposit.
    Idle,
    /// Inside a travel bracket.
    Travel,
    /// Depositing.
    Extrude,
    /// Filament retracted.
    Retracted,
}

#[derive(Debug, Clone, Copy, Default)]
struct Emitted {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    feed: Option<f64>,
    e: Option<f64>,
}

/// Lowers positions and brackets into a checked instruction stream.
#[derive(Debug, Clone)]
pub struct ToolpathAssembler {
    options: AssemblerOptions,
    position: Point3,
    extruded: f64,
    feed: f64,
    rate: f64,
    travelling: bool,
    retracted: Option<(f64, f64)>,
    extruding: bool,
    pending: Option<Pending>,
    last: Emitted,
    out: Vec<Instruction>,
}

impl ToolpathAssembler {
    /// Assembler at the origin.
    pub fn new(options: AssemblerOptions) -> Self {
        Self {
            options,
            position: Point3::origin(),
            extruded: 0.0,
            feed: 0.0,
            rate: 0.0,
            travelling: false,
            retracted: None,
            extruding: false,
            pending: None,
            last: Emitted::default(),
            out: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> AssemblerState {
        if self.retracted.is_some() {
            AssemblerState::Retracted
        } else if self.travelling {
            AssemblerState::Travel
        } else if self.extruding {
            AssemblerState::Extrude
        } else {
            AssemblerState::Idle
        }
    }

    /// Last emitted position. Queued points are not included.
    pub fn position(&self) -> Point3 {
        self.position
    }

    /// Position after the queued points are emitted.
    pub fn pending_position(&self) -> Point3 {
        self.pending.map_or(self.position, |p| p.to)
    }

    /// Accumulated extrusion (mm of filament).
    pub fn extruded(&self) -> f64 {
        self.extruded
    }

    /// Number of deposit points merged into the queue.
    pub fn queued(&self) -> usize {
        self.pending.map_or(0, |p| p.points)
    }

    /// Is the filament retracted?
    pub fn is_retracted(&self) -> bool {
        self.retracted.is_some()
    }

    /// Is a travel bracket open?
    pub fn in_travel(&self) -> bool {
        self.travelling
    }

    /// Instructions emitted so far.
    pub fn instructions(&self) -> &[Instruction] {
        &self.out
    }

    /// Open a travel bracket.
    pub fn begin_travel(&mut self) -> Result<()> {
        if self.travelling {
            return Err(ToolpathError::NestedTravel);
        }
        self.flush()?;
        self.travelling = true;
        self.extruding = false;
        Ok(())
    }

    /// Close the travel bracket.
    pub fn end_travel(&mut self) -> Result<()> {
        if !self.travelling {
            return Err(ToolpathError::NotInTravel);
        }
        self.travelling = false;
        Ok(())
    }

    /// Non-depositing move; only valid inside a travel bracket.
    pub fn travel_to(&mut self, to: Point3, feed: f64) -> Result<()> {
        if !self.travelling {
            return Err(ToolpathError::NotInTravel);
        }
        self.check_bounds(&to)?;
        self.emit_travel(to, feed);
        Ok(())
    }

    /// Move to height `z` without depositing. Queued deposits are emitted
    /// first, so the move is purely vertical from where they end.
    pub fn change_plane(&mut self, z: f64, feed: f64) -> Result<()> {
        let from = self.pending_position();
        let to = Point3::new(from.x, from.y, z);
        self.check_bounds(&to)?;
        self.flush()?;
        self.extruding = false;
        self.emit_travel(to, feed);
        Ok(())
    }

    /// Retract by `distance` at `feed`.
    pub fn begin_retract(&mut self, distance: f64, feed: f64) -> Result<()> {
        if self.retracted.is_some() {
            return Err(ToolpathError::NestedRetract);
        }
        self.flush()?;
        self.extruding = false;
        self.retracted = Some((distance, feed));
        self.out.push(Instruction::Retract { length: distance, feed });
        Ok(())
    }

    /// Undo the open retraction.
    pub fn end_retract(&mut self) -> Result<()> {
        let (length, feed) = self.retracted.take().ok_or(ToolpathError::NotRetracted)?;
        self.out.push(Instruction::Unretract { length, feed });
        Ok(())
    }

    /// Deposit towards `to` at `feed`, consuming `rate` mm of filament per mm
    /// of path.
    pub fn extrude_to(&mut self, to: Point3, feed: f64, rate: f64) -> Result<()> {
        if self.retracted.is_some() {
            return Err(ToolpathError::ExtrudeWhileRetracted);
        }
        if self.travelling {
            return Err(ToolpathError::ExtrudeDuringTravel);
        }
        self.check_bounds(&to)?;

        let from = self.pending_position();
        if self.pending.is_some() && (feed != self.feed || rate != self.rate || to.z != from.z) {
            self.flush()?;
        }
        self.feed = feed;
        self.rate = rate;
        self.extruding = true;
        self.submit(to);
        Ok(())
    }

    /// Emit the queued deposit as a single move to its last point.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            self.emit_extrude(pending.to, pending.arc);
        }
        Ok(())
    }

    /// Pause for `millis`.
    pub fn dwell(&mut self, millis: u64) -> Result<()> {
        self.flush()?;
        self.out.push(Instruction::Dwell { millis });
        Ok(())
    }

    /// Set the part-cooling fan, clamped to `0.0..=1.0`.
    pub fn fan(&mut self, speed: f64) -> Result<()> {
        self.flush()?;
        self.out.push(Instruction::Fan {
            speed: speed.clamp(0.0, 1.0),
        });
        Ok(())
    }

    /// Set a heater.
    pub fn temperature(&mut self, heater: Heater, target: f64, wait: bool) -> Result<()> {
        self.flush()?;
        self.out.push(Instruction::Temperature { heater, target, wait });
        Ok(())
    }

    /// Add a comment.
    pub fn comment(&mut self, text: impl Into<String>) -> Result<()> {
        self.flush()?;
        self.out.push(Instruction::comment(text));
        Ok(())
    }

    /// Drain the queue and hand back the stream.
    pub fn finish(mut self) -> Result<Vec<Instruction>> {
        if self.travelling {
            return Err(ToolpathError::UnbalancedBracket);
        }
        self.flush()?;
        Ok(self.out)
    }

    fn submit(&mut self, to: Point3) {
        let from = self.pending_position();
        let length = (to - from).norm();
        if length <= LENGTH_EPSILON {
            return;
        }
        let step = self.options.min_extrude_step;
        let Some(mut pending) = self.pending.take() else {
            if length >= step {
                self.emit_extrude(to, length);
            } else {
                self.pending = Some(Pending { to, arc: length, points: 1 });
            }
            return;
        };

        let before = pending.arc;
        if before + length < step - LENGTH_EPSILON {
            pending.to = to;
            pending.arc += length;
            pending.points += 1;
            self.pending = Some(pending);
            return;
        }

        let t = ((step - before) / length).clamp(0.0, 1.0);
        let at = lerp3(&from, &to, t);
        self.emit_extrude(at, step);
        let rest = (to - at).norm();
        if rest > LENGTH_EPSILON {
            self.submit(to);
        } else {
            trace!(x = to.x, y = to.y, "step boundary on a queued point");
            // Keep the end point so the run still closes with one flushed point.
            self.pending = Some(Pending { to, arc: 0.0, points: 1 });
        }
    }

    fn check_bounds(&self, to: &Point3) -> Result<()> {
        match self.options.volume {
            Some(volume) if !volume.contains(to) => Err(ToolpathError::OutOfBounds {
                x: to.x,
                y: to.y,
                z: to.z,
            }),
            _ => Ok(()),
        }
    }

    fn emit_travel(&mut self, to: Point3, feed: f64) {
        let eps = self.options.dedup_epsilon;
        let instruction = Instruction::Travel {
            x: keep(&mut self.last.x, to.x, eps),
            y: keep(&mut self.last.y, to.y, eps),
            z: keep(&mut self.last.z, to.z, eps),
            feed: keep(&mut self.last.feed, feed, eps),
        };
        self.out.push(instruction);
        self.position = to;
    }

    fn emit_extrude(&mut self, to: Point3, arc: f64) {
        self.extruded += arc * self.rate;
        let eps = self.options.dedup_epsilon;
        let instruction = Instruction::Extrude {
            x: keep(&mut self.last.x, to.x, eps),
            y: keep(&mut self.last.y, to.y, eps),
            z: keep(&mut self.last.z, to.z, eps),
            feed: keep(&mut self.last.feed, self.feed, eps),
            e: keep(&mut self.last.e, self.extruded, eps),
        };
        // Fully suppressed moves carry nothing.
        if !matches!(
            instruction,
            Instruction::Extrude { x: None, y: None, z: None, feed: None, e: None }
        ) {
            self.out.push(instruction);
        }
        self.position = to;
    }
}

/// `Some(value)` unless it is within `eps` of the previously emitted one.
fn keep(slot: &mut Option<f64>, value: f64, eps: Option<f64>) -> Option<f64> {
    match (eps, *slot) {
        (Some(eps), Some(previous)) if (value - previous).abs() <= eps => None,
        _ => {
            *slot = Some(value);
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn extrude_targets(out: &[Instruction]) -> Vec<f64> {
        out.iter()
            .filter_map(|i| match i {
                Instruction::Extrude { x, .. } => *x,
                _ => None,
            })
            .collect()
    }

    fn estimate_e(out: &[Instruction]) -> f64 {
        out.iter()
            .filter_map(|i| match i {
                Instruction::Extrude { e, .. } => *e,
                _ => None,
            })
            .last()
            .unwrap_or(0.0)
    }

    fn stepped(step: f64) -> ToolpathAssembler {
        ToolpathAssembler::new(AssemblerOptions {
            min_extrude_step: step,
            ..Default::default()
        })
    }

    #[test]
    fn test_brackets_cannot_nest() {
        let mut asm = ToolpathAssembler::new(AssemblerOptions::default());
        assert_eq!(asm.end_travel(), Err(ToolpathError::NotInTravel));
        assert_eq!(asm.end_retract(), Err(ToolpathError::NotRetracted));
        asm.begin_travel().unwrap();
        assert_eq!(asm.begin_travel(), Err(ToolpathError::NestedTravel));
        assert_eq!(
            asm.extrude_to(Point3::new(1.0, 0.0, 0.0), 1200.0, 0.03),
            Err(ToolpathError::ExtrudeDuringTravel)
        );
        asm.end_travel().unwrap();
        asm.begin_retract(1.0, 1800.0).unwrap();
        assert_eq!(asm.state(), AssemblerState::Retracted);
        assert_eq!(asm.begin_retract(1.0, 1800.0), Err(ToolpathError::NestedRetract));
        assert_eq!(
            asm.extrude_to(Point3::new(1.0, 0.0, 0.0), 1200.0, 0.03),
            Err(ToolpathError::ExtrudeWhileRetracted)
        );
        asm.end_retract().unwrap();
        assert_eq!(asm.state(), AssemblerState::Idle);
    }

    #[test]
    fn test_travel_needs_bracket() {
        let mut asm = ToolpathAssembler::new(AssemblerOptions::default());
        assert_eq!(
            asm.travel_to(Point3::new(1.0, 1.0, 0.2), 9000.0),
            Err(ToolpathError::NotInTravel)
        );
        asm.begin_travel().unwrap();
        asm.travel_to(Point3::new(1.0, 1.0, 0.2), 9000.0).unwrap();
        assert_eq!(asm.state(), AssemblerState::Travel);
        assert_eq!(asm.clone().finish(), Err(ToolpathError::UnbalancedBracket));
        asm.end_travel().unwrap();
        assert_eq!(asm.finish().unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut asm = ToolpathAssembler::new(AssemblerOptions {
            volume: Some(BuildVolume {
                x: 10.0,
                y: 10.0,
                z: 10.0,
            }),
            ..Default::default()
        });
        assert_eq!(
            asm.extrude_to(Point3::new(11.0, 0.0, 0.0), 1200.0, 0.03),
            Err(ToolpathError::OutOfBounds {
                x: 11.0,
                y: 0.0,
                z: 0.0
            })
        );
        assert!(asm.change_plane(10.5, 600.0).is_err());
        assert!(asm.change_plane(0.2, 600.0).is_ok());
    }

    #[test]
    fn test_long_moves_pass_straight_through() {
        let mut asm = stepped(0.1);
        asm.extrude_to(Point3::new(1.0, 0.0, 0.0), 1200.0, 0.05).unwrap();
        asm.extrude_to(Point3::new(2.0, 0.0, 0.0), 1200.0, 0.05).unwrap();
        assert_eq!(asm.queued(), 0);
        assert_eq!(extrude_targets(asm.instructions()), vec![1.0, 2.0]);
        assert_relative_eq!(asm.extruded(), 0.1, epsilon = 1e-12);
        assert_eq!(asm.state(), AssemblerState::Extrude);
    }

    #[test]
    fn test_short_moves_emit_on_step_boundaries() {
        let mut asm = stepped(0.1);
        for i in 1..=25 {
            asm.extrude_to(Point3::new(0.03 * i as f64, 0.0, 0.0), 1200.0, 1.0)
                .unwrap();
        }
        let xs = extrude_targets(asm.instructions());
        assert_eq!(xs.len(), 7);
        for (k, x) in xs.iter().enumerate() {
            assert_relative_eq!(*x, 0.1 * (k + 1) as f64, epsilon = 1e-9);
        }

        let out = asm.finish().unwrap();
        let xs = extrude_targets(&out);
        assert_eq!(xs.len(), 8);
        assert_relative_eq!(xs[7], 0.75, epsilon = 1e-9);
        match out.last() {
            Some(Instruction::Extrude { e: Some(e), .. }) => assert_relative_eq!(*e, 0.75, epsilon = 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_long_move_after_queue_splits_once() {
        let mut asm = stepped(0.1);
        asm.extrude_to(Point3::new(0.04, 0.0, 0.0), 1200.0, 1.0).unwrap();
        asm.extrude_to(Point3::new(1.04, 0.0, 0.0), 1200.0, 1.0).unwrap();
        let xs = extrude_targets(asm.instructions());
        assert_eq!(xs.len(), 2);
        assert_relative_eq!(xs[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(xs[1], 1.04, epsilon = 1e-12);
        assert_relative_eq!(asm.extruded(), 1.04, epsilon = 1e-12);
    }

    #[test]
    fn test_retract_and_plane_change_drain_queue() {
        let mut asm = stepped(0.1);
        asm.extrude_to(Point3::new(0.05, 0.0, 0.0), 1200.0, 1.0).unwrap();
        assert_eq!(asm.queued(), 1);
        asm.begin_retract(0.8, 2100.0).unwrap();
        assert_eq!(asm.queued(), 0);
        assert!(matches!(asm.instructions()[0], Instruction::Extrude { .. }));
        assert!(matches!(asm.instructions()[1], Instruction::Retract { .. }));
        asm.end_retract().unwrap();

        asm.extrude_to(Point3::new(0.08, 0.0, 0.0), 1200.0, 1.0).unwrap();
        assert_eq!(asm.position(), Point3::new(0.05, 0.0, 0.0));
        asm.change_plane(0.4, 600.0).unwrap();
        assert_eq!(asm.queued(), 0);
        assert_eq!(asm.position(), Point3::new(0.08, 0.0, 0.4));
    }

    #[test]
    fn test_plane_change_after_queue_is_vertical() {
        let mut asm = stepped(0.1);
        asm.extrude_to(Point3::new(0.02, 0.03, 0.0), 1200.0, 1.0).unwrap();
        asm.extrude_to(Point3::new(0.04, 0.06, 0.0), 1200.0, 1.0).unwrap();
        assert_eq!(asm.queued(), 2);
        asm.change_plane(0.4, 600.0).unwrap();

        let out = asm.finish().unwrap();
        match &out[..] {
            [Instruction::Extrude { x: ex, y: ey, .. }, Instruction::Travel { x, y, z, .. }] => {
                assert_eq!((*ex, *ey), (Some(0.04), Some(0.06)));
                assert_eq!((*x, *y, *z), (Some(0.04), Some(0.06), Some(0.4)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejected_plane_change_keeps_queue() {
        let mut asm = ToolpathAssembler::new(AssemblerOptions {
            min_extrude_step: 0.1,
            volume: Some(BuildVolume {
                x: 10.0,
                y: 10.0,
                z: 10.0,
            }),
            ..Default::default()
        });
        asm.extrude_to(Point3::new(0.05, 0.0, 0.0), 1200.0, 1.0).unwrap();
        assert!(asm.change_plane(10.5, 600.0).is_err());
        assert_eq!(asm.queued(), 1);
        assert!(asm.instructions().is_empty());
    }

    #[test]
    fn test_many_tiny_moves_emit_only_on_step_boundaries() {
        let mut asm = stepped(0.1);
        for i in 1..=200 {
            asm.extrude_to(Point3::new(0.001 * i as f64, 0.0, 0.0), 1200.0, 1.0)
                .unwrap();
        }
        let xs = extrude_targets(asm.instructions());
        assert_eq!(xs.len(), 2);
        assert_relative_eq!(xs[0], 0.1, epsilon = 1e-9);
        assert_relative_eq!(xs[1], 0.2, epsilon = 1e-9);
        assert_eq!(asm.queued(), 1);

        let out = asm.finish().unwrap();
        assert_eq!(extrude_targets(&out).len(), 3);
        assert_relative_eq!(estimate_e(&out), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_queue_holds_any_number_of_points() {
        let mut asm = stepped(10.0);
        for i in 1..=500 {
            asm.extrude_to(Point3::new(0.01 * i as f64, 0.0, 0.0), 1200.0, 1.0)
                .unwrap();
        }
        assert_eq!(asm.queued(), 500);
        assert!(asm.instructions().is_empty());
        assert_eq!(extrude_targets(&asm.finish().unwrap()).len(), 1);
    }

    #[test]
    fn test_duplicate_suppression() {
        let mut asm = ToolpathAssembler::new(AssemblerOptions {
            dedup_epsilon: Some(1e-4),
            ..Default::default()
        });
        asm.begin_travel().unwrap();
        asm.travel_to(Point3::new(5.0, 5.0, 0.2), 9000.0).unwrap();
        asm.end_travel().unwrap();
        asm.extrude_to(Point3::new(10.0, 5.0, 0.2), 1200.0, 0.03).unwrap();

        assert_eq!(asm.instructions()[1], Instruction::Extrude {
            x: Some(10.0),
            y: None,
            z: None,
            feed: Some(1200.0),
            e: Some(5.0 * 0.03),
        });
    }
}
