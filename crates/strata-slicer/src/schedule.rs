//! Turning curve sets into ordered tool paths.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_math::{Point2, Point3};

use crate::error::{Result, SlicerError};
use crate::fill::{CurveSet, FillCurve, FillLoop, FillType};
use crate::settings::PrintSettings;

/// Kind of tool motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// Non-depositing move within a layer.
    Travel,
    /// Depositing move.
    Deposit,
    /// Move to a new layer height.
    PlaneChange,
}

/// One continuous tool motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPath {
    /// Motion kind.
    pub kind: PathKind,
    /// Fill type of a deposit.
    pub fill: Option<FillType>,
    /// Vertices, starting at the position the tool moves from.
    pub points: Vec<Point3>,
    /// Feed rate (mm/min).
    pub feed: f64,
}

impl ToolPath {
    /// Path length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Time to traverse the path at its feed (seconds).
    pub fn duration(&self) -> f64 {
        if self.feed <= 0.0 {
            return 0.0;
        }
        self.length() / (self.feed / 60.0)
    }
}

/// Accumulates the paths of one layer while tracking the tool position.
#[derive(Debug, Clone)]
pub struct LayerPathBuilder {
    position: Point3,
    travel_feed: f64,
    paths: Vec<ToolPath>,
}

impl LayerPathBuilder {
    /// Start at `position`.
    pub fn new(position: Point3, travel_feed: f64) -> Self {
        Self {
            position,
            travel_feed,
            paths: Vec::new(),
        }
    }

    /// Current tool position.
    pub fn position(&self) -> Point3 {
        self.position
    }

    /// Current position in the layer plane.
    pub fn position_2d(&self) -> Point2 {
        Point2::new(self.position.x, self.position.y)
    }

    /// Move to height `z`.
    pub fn append_z_change(&mut self, z: f64, feed: f64) {
        if (z - self.position.z).abs() < 1.0e-9 {
            return;
        }
        let to = Point3::new(self.position.x, self.position.y, z);
        self.paths.push(ToolPath {
            kind: PathKind::PlaneChange,
            fill: None,
            points: vec![self.position, to],
            feed,
        });
        self.position = to;
    }

    /// Travel to `to` at the current height.
    pub fn append_travel(&mut self, to: Point2) {
        let to = Point3::new(to.x, to.y, self.position.z);
        if (to - self.position).norm() < 1.0e-9 {
            return;
        }
        self.paths.push(ToolPath {
            kind: PathKind::Travel,
            fill: None,
            points: vec![self.position, to],
            feed: self.travel_feed,
        });
        self.position = to;
    }

    /// Deposit along `points`, travelling to the first one if needed.
    pub fn append_deposition(&mut self, points: &[Point2], feed: f64, fill: FillType) {
        let Some(first) = points.first() else {
            return;
        };
        self.append_travel(*first);
        if points.len() < 2 {
            return;
        }
        let z = self.position.z;
        let points: Vec<Point3> = points.iter().map(|p| Point3::new(p.x, p.y, z)).collect();
        self.position = points[points.len() - 1];
        self.paths.push(ToolPath {
            kind: PathKind::Deposit,
            fill: Some(fill),
            points,
            feed,
        });
    }

    /// Paths so far.
    pub fn paths(&self) -> &[ToolPath] {
        &self.paths
    }

    /// Total travel distance so far.
    pub fn travel_length(&self) -> f64 {
        self.paths
            .iter()
            .filter(|p| p.kind == PathKind::Travel)
            .map(ToolPath::length)
            .sum()
    }

    /// Finish the layer.
    pub fn into_paths(self) -> Vec<ToolPath> {
        self.paths
    }
}

/// Coarse speed selection for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedHint {
    /// Slow, e.g. the first layer.
    Careful,
    /// Regular speed.
    #[default]
    Rapid,
}

/// Chooses the feed for a deposit.
pub trait FeedPolicy: Send + Sync {
    /// Feed rate (mm/min) for `fill` under `hint`.
    fn feed_rate(&self, fill: FillType, hint: SpeedHint) -> f64;
}

/// Feed policy driven by [`PrintSettings`].
#[derive(Debug, Clone)]
pub struct SettingsFeedPolicy {
    careful: f64,
    rapid: f64,
    outer_multiplier: f64,
    support_multiplier: f64,
    bridge_multiplier: f64,
}

impl SettingsFeedPolicy {
    /// Read feeds from `settings`.
    pub fn new(settings: &PrintSettings) -> Self {
        Self {
            careful: settings.careful_extrude_feed,
            rapid: settings.rapid_extrude_feed,
            outer_multiplier: settings.outer_shell_feed_multiplier,
            support_multiplier: settings.support_feed_multiplier,
            bridge_multiplier: settings.bridge_feed_multiplier,
        }
    }
}

impl FeedPolicy for SettingsFeedPolicy {
    fn feed_rate(&self, fill: FillType, hint: SpeedHint) -> f64 {
        let base = match hint {
            SpeedHint::Careful => self.careful,
            SpeedHint::Rapid => self.rapid,
        };
        match fill {
            FillType::OuterShell => base.min(self.careful) * self.outer_multiplier.max(0.0),
            FillType::Bridge => self.careful * self.bridge_multiplier,
            FillType::Support => base * self.support_multiplier,
            _ => base,
        }
    }
}

/// Emits curve sets as tool paths.
pub trait PathScheduler {
    /// Schedule `sets`, appending to `builder`.
    fn append_curve_sets(&mut self, sets: Vec<CurveSet>, builder: &mut LayerPathBuilder) -> Result<()>;

    /// Current speed hint.
    fn speed_hint(&self) -> SpeedHint;

    /// Change the speed hint.
    fn set_speed_hint(&mut self, hint: SpeedHint);
}

impl<S: PathScheduler + ?Sized> PathScheduler for Box<S> {
    fn append_curve_sets(&mut self, sets: Vec<CurveSet>, builder: &mut LayerPathBuilder) -> Result<()> {
        (**self).append_curve_sets(sets, builder)
    }

    fn speed_hint(&self) -> SpeedHint {
        (**self).speed_hint()
    }

    fn set_speed_hint(&mut self, hint: SpeedHint) {
        (**self).set_speed_hint(hint)
    }
}

/// Emits paths in input order, starting each loop at its vertex nearest to
/// the tool.
pub struct SequentialScheduler {
    feeds: Arc<dyn FeedPolicy>,
    hint: SpeedHint,
}

impl SequentialScheduler {
    /// Create with a feed policy.
    pub fn new(feeds: Arc<dyn FeedPolicy>) -> Self {
        Self {
            feeds,
            hint: SpeedHint::default(),
        }
    }

    fn append_loop(&self, item: &FillLoop, builder: &mut LayerPathBuilder) {
        let Some((start, _)) = item.polygon.nearest_vertex(&builder.position_2d()) else {
            return;
        };
        let mut points = item.polygon.rotated(start).points;
        points.push(points[0]);
        let feed = self.feeds.feed_rate(item.fill, self.hint);
        builder.append_deposition(&points, feed, item.fill);
    }

    fn append_curve(&self, item: &FillCurve, builder: &mut LayerPathBuilder) {
        let feed = self.feeds.feed_rate(item.fill, self.hint);
        builder.append_deposition(&item.polyline.points, feed, item.fill);
    }
}

impl PathScheduler for SequentialScheduler {
    fn append_curve_sets(&mut self, sets: Vec<CurveSet>, builder: &mut LayerPathBuilder) -> Result<()> {
        for set in &sets {
            for item in &set.loops {
                self.append_loop(item, builder);
            }
            for item in &set.curves {
                self.append_curve(item, builder);
            }
        }
        Ok(())
    }

    fn speed_hint(&self) -> SpeedHint {
        self.hint
    }

    fn set_speed_hint(&mut self, hint: SpeedHint) {
        self.hint = hint;
    }
}

enum Pending {
    Loop(FillLoop),
    Curve(FillCurve),
}

/// Buffers curve sets and emits them in greedy nearest-next order.
#[derive(Default)]
pub struct SortingScheduler {
    pending: Vec<Pending>,
    hint: SpeedHint,
}

impl SortingScheduler {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `sets`.
    pub fn add(&mut self, sets: Vec<CurveSet>) {
        for set in sets {
            self.pending.extend(set.loops.into_iter().map(Pending::Loop));
            self.pending.extend(set.curves.into_iter().map(Pending::Curve));
        }
    }

    /// Number of buffered loops and curves.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Is the buffer empty?
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Repeatedly emit the buffered item closest to the tool through
    /// `target`. Open curves are reversed when their end is closer.
    pub fn drain_into<S: PathScheduler + ?Sized>(
        &mut self,
        target: &mut S,
        builder: &mut LayerPathBuilder,
    ) -> Result<()> {
        let mut remaining = std::mem::take(&mut self.pending);
        while !remaining.is_empty() {
            let here = builder.position_2d();
            let nearest = remaining
                .iter()
                .enumerate()
                .map(|(i, item)| (i, distance_to(item, &here)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(i, _)| i);

            let set = match remaining.swap_remove(nearest) {
                Pending::Loop(item) => CurveSet {
                    loops: vec![item],
                    curves: Vec::new(),
                },
                Pending::Curve(mut item) => {
                    let to_start = item.polyline.start().map_or(f64::MAX, |p| (p - here).norm());
                    let to_end = item.polyline.end().map_or(f64::MAX, |p| (p - here).norm());
                    if to_end < to_start {
                        item.polyline.reverse();
                    }
                    CurveSet {
                        loops: Vec::new(),
                        curves: vec![item],
                    }
                }
            };
            target.append_curve_sets(vec![set], builder)?;
        }
        Ok(())
    }
}

fn distance_to(item: &Pending, here: &Point2) -> f64 {
    match item {
        Pending::Loop(l) => l.polygon.nearest_vertex(here).map_or(f64::MAX, |(_, d)| d),
        Pending::Curve(c) => {
            let start = c.polyline.start().map_or(f64::MAX, |p| (p - here).norm());
            let end = c.polyline.end().map_or(f64::MAX, |p| (p - here).norm());
            start.min(end)
        }
    }
}

/// As a [`PathScheduler`] this only buffers: appended sets reach the builder
/// when [`SortingScheduler::drain_into`] hands them to a target. The stored
/// speed hint is not applied; drained paths take the target's hint.
impl PathScheduler for SortingScheduler {
    fn append_curve_sets(&mut self, sets: Vec<CurveSet>, _builder: &mut LayerPathBuilder) -> Result<()> {
        self.add(sets);
        Ok(())
    }

    fn speed_hint(&self) -> SpeedHint {
        self.hint
    }

    fn set_speed_hint(&mut self, hint: SpeedHint) {
        self.hint = hint;
    }
}

/// Wraps a scheduler; between [`GroupScheduler::begin_group`] and
/// [`GroupScheduler::end_group`] everything is buffered and then emitted in
/// nearest-next order.
pub struct GroupScheduler<S: PathScheduler> {
    target: S,
    group: Option<SortingScheduler>,
}

impl<S: PathScheduler> GroupScheduler<S> {
    /// Wrap `target`.
    pub fn new(target: S) -> Self {
        Self {
            target,
            group: None,
        }
    }

    /// Start buffering. Groups do not nest.
    pub fn begin_group(&mut self) -> Result<()> {
        if self.group.is_some() {
            return Err(SlicerError::NestedGroup);
        }
        self.group = Some(SortingScheduler::new());
        Ok(())
    }

    /// Sort and emit the buffered group.
    pub fn end_group(&mut self, builder: &mut LayerPathBuilder) -> Result<()> {
        let mut group = self.group.take().ok_or(SlicerError::UnbalancedGroup)?;
        group.drain_into(&mut self.target, builder)
    }

    /// Is a group open?
    pub fn in_group(&self) -> bool {
        self.group.is_some()
    }

    /// Schedule `sets` as one sorted group.
    pub fn append_group(&mut self, sets: Vec<CurveSet>, builder: &mut LayerPathBuilder) -> Result<()> {
        self.begin_group()?;
        self.append_curve_sets(sets, builder)?;
        self.end_group(builder)
    }

    /// The wrapped scheduler.
    pub fn into_inner(self) -> S {
        self.target
    }
}

impl<S: PathScheduler> PathScheduler for GroupScheduler<S> {
    fn append_curve_sets(&mut self, sets: Vec<CurveSet>, builder: &mut LayerPathBuilder) -> Result<()> {
        match self.group.as_mut() {
            Some(group) => {
                group.add(sets);
                Ok(())
            }
            None => self.target.append_curve_sets(sets, builder),
        }
    }

    fn speed_hint(&self) -> SpeedHint {
        self.target.speed_hint()
    }

    fn set_speed_hint(&mut self, hint: SpeedHint) {
        self.target.set_speed_hint(hint);
    }
}
