//! Passes over finished layers.

use strata_math::Point2;
use tracing::warn;

use crate::driver::LayerToolpaths;
use crate::fill::FillType;
use crate::region::Region;
use crate::schedule::PathKind;
use crate::settings::PrintSettings;
use crate::support::SupportPlan;

/// Lift deposit vertices that sit directly on the previous layer's support
/// by `offset`, so the part releases from the support more easily.
///
/// Returns the number of vertices moved.
pub fn raise_above_support(layer: &mut LayerToolpaths, support_below: &[Region], offset: f64) -> usize {
    if support_below.is_empty() || offset <= 0.0 {
        return 0;
    }
    let mut raised = 0;
    for path in &mut layer.paths {
        if path.kind != PathKind::Deposit || path.fill == Some(FillType::Support) {
            continue;
        }
        for p in &mut path.points {
            let xy = Point2::new(p.x, p.y);
            if support_below.iter().any(|r| r.contains(&xy)) {
                p.z += offset;
                raised += 1;
            }
        }
    }
    raised
}

/// Slow a layer down uniformly until it takes at least `min_time` seconds,
/// never below `min_multiplier` times the planned feeds.
///
/// Returns the applied feed multiplier.
pub fn enforce_min_layer_time(layer: &mut LayerToolpaths, min_time: f64, min_multiplier: f64) -> f64 {
    let time = layer.deposition_time();
    if min_time <= 0.0 || time <= 0.0 || time >= min_time {
        return 1.0;
    }

    let wanted = time / min_time;
    let multiplier = wanted.max(min_multiplier);
    if multiplier > wanted {
        warn!(
            layer = layer.index,
            time,
            min_time,
            "layer stays below minimum time at slowest allowed feed"
        );
    }
    for path in &mut layer.paths {
        if path.kind == PathKind::Deposit {
            path.feed *= multiplier;
        }
    }
    multiplier
}

/// Apply every enabled pass to `layers`.
pub fn postprocess(layers: &mut [LayerToolpaths], plan: &SupportPlan, settings: &PrintSettings) {
    for layer in layers {
        if settings.support_release_offset > 0.0 && layer.index > 0 {
            raise_above_support(layer, plan.support(layer.index - 1), settings.support_release_offset);
        }
        enforce_min_layer_time(layer, settings.min_layer_time, settings.min_feed_multiplier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Polygon;
    use crate::schedule::ToolPath;
    use strata_math::Point3;

    fn layer_with_line(length: f64, feed: f64) -> LayerToolpaths {
        LayerToolpaths {
            index: 1,
            z: 0.3,
            height: 0.2,
            paths: vec![ToolPath {
                kind: PathKind::Deposit,
                fill: Some(FillType::SolidFill),
                points: vec![Point3::new(0.0, 0.0, 0.3), Point3::new(length, 0.0, 0.3)],
                feed,
            }],
        }
    }

    #[test]
    fn test_short_layer_is_slowed() {
        // 50 mm at 3000 mm/min is one second.
        let mut layer = layer_with_line(50.0, 3000.0);
        let m = enforce_min_layer_time(&mut layer, 4.0, 0.1);
        assert!((m - 0.25).abs() < 1e-12);
        assert!((layer.deposition_time() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_slowdown_is_floor_clamped() {
        let mut layer = layer_with_line(50.0, 3000.0);
        let m = enforce_min_layer_time(&mut layer, 10.0, 0.5);
        assert!((m - 0.5).abs() < 1e-12);
        assert!((layer.paths[0].feed - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_layer_untouched() {
        let mut layer = layer_with_line(500.0, 3000.0);
        assert_eq!(enforce_min_layer_time(&mut layer, 5.0, 0.25), 1.0);
        assert_eq!(layer.paths[0].feed, 3000.0);
    }

    #[test]
    fn test_raise_over_support() {
        let mut layer = layer_with_line(10.0, 3000.0);
        let support = vec![Region::simple(Polygon::rectangle(
            Point2::new(8.0, -1.0),
            Point2::new(12.0, 1.0),
        ))];
        assert_eq!(raise_above_support(&mut layer, &support, 0.1), 1);
        assert!((layer.paths[0].points[1].z - 0.4).abs() < 1e-12);
        assert!((layer.paths[0].points[0].z - 0.3).abs() < 1e-12);
    }
}
