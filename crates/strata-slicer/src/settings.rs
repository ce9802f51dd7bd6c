//! Print settings consumed by every pipeline stage.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlicerError};

/// Inclusive range of layer indices to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRange {
    /// First layer to print.
    pub first: usize,
    /// Last layer to print (inclusive).
    pub last: usize,
}

impl LayerRange {
    /// Does the range include layer `index`?
    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last
    }
}

/// Slicing, fill, support and feed parameters.
///
/// Lengths are in mm, feeds in mm/min, times in seconds and angles in
/// degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    /// Layer height.
    pub layer_height: f64,
    /// Slice each layer at its mid-height instead of its top.
    pub slice_at_mid_height: bool,
    /// Classify loops as outer/hole by winding instead of nesting depth.
    pub trust_winding: bool,
    /// Keep overlapping holes separate instead of merging them.
    pub allow_overlapping_holes: bool,
    /// Restrict printing to a range of layers.
    pub layer_range: Option<LayerRange>,

    /// Nozzle diameter.
    pub nozzle_diameter: f64,
    /// Filament diameter.
    pub filament_diameter: f64,
    /// Extrusion width as a multiple of the nozzle diameter.
    pub path_width_multiplier: f64,
    /// Width used to embed open paths into solids. Required when any mesh
    /// contributes embedded open paths.
    pub open_path_width: Option<f64>,

    /// Number of perimeter shells.
    pub shell_count: usize,
    /// Solid layers under a top surface.
    pub roof_layers: usize,
    /// Solid layers over a bottom surface.
    pub floor_layers: usize,
    /// Extra shells wrapped around solid fill that borders sparse infill.
    pub interior_solid_shells: usize,
    /// Remove inner shell sections thinner than one path width.
    pub filter_self_overlaps: bool,

    /// Solid fill line spacing as a multiple of the path width.
    pub solid_fill_spacing_multiplier: f64,
    /// Sparse infill line spacing as a multiple of the path width.
    pub sparse_infill_spacing_multiplier: f64,
    /// Fill angles cycled layer by layer.
    pub infill_angles: Vec<f64>,
    /// Regions larger than this in either direction are filled tile by tile.
    pub infill_tile_size: f64,

    /// Generate support under overhangs.
    pub generate_support: bool,
    /// Steepest overhang, measured from horizontal, printable without support.
    pub support_overhang_angle: f64,
    /// Support line spacing as a multiple of the path width.
    pub support_spacing_multiplier: f64,
    /// Horizontal clearance between support and the part.
    pub support_gap: f64,
    /// Diameter of support dots placed under tips and support points.
    pub support_point_diameter: f64,
    /// Distance used to merge near-miss support polygons.
    pub support_merge_distance: f64,
    /// Simplification tolerance applied to support outlines.
    pub support_simplify_tolerance: f64,
    /// Support islands below this area get shells instead of lines (mm²).
    pub support_small_island_area: f64,
    /// Lift applied to vertices printed on top of support; zero disables it.
    pub support_release_offset: f64,

    /// Detect and print bridges.
    pub enable_bridging: bool,
    /// Widest span treated as a bridge.
    pub max_bridge_width: f64,

    /// Extrusion feed used on careful layers and outer shells.
    pub careful_extrude_feed: f64,
    /// Extrusion feed used on regular layers.
    pub rapid_extrude_feed: f64,
    /// Travel feed.
    pub travel_feed: f64,
    /// Z feed for layer changes.
    pub z_feed: f64,
    /// Multiplier applied to outer shell feed.
    pub outer_shell_feed_multiplier: f64,
    /// Multiplier applied to support feed.
    pub support_feed_multiplier: f64,
    /// Multiplier applied to bridge feed.
    pub bridge_feed_multiplier: f64,

    /// Minimum time per layer; faster layers are slowed down.
    pub min_layer_time: f64,
    /// Lowest fraction of the planned feed the layer-time pass may use.
    pub min_feed_multiplier: f64,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            layer_height: 0.2,
            slice_at_mid_height: true,
            trust_winding: false,
            allow_overlapping_holes: false,
            layer_range: None,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            path_width_multiplier: 1.0,
            open_path_width: None,
            shell_count: 2,
            roof_layers: 2,
            floor_layers: 2,
            interior_solid_shells: 0,
            filter_self_overlaps: true,
            solid_fill_spacing_multiplier: 1.0,
            sparse_infill_spacing_multiplier: 5.0,
            infill_angles: vec![-45.0, 45.0],
            infill_tile_size: 100.0,
            generate_support: false,
            support_overhang_angle: 35.0,
            support_spacing_multiplier: 5.0,
            support_gap: 0.4,
            support_point_diameter: 1.2,
            support_merge_distance: 0.4,
            support_simplify_tolerance: 0.05,
            support_small_island_area: 4.0,
            support_release_offset: 0.0,
            enable_bridging: true,
            max_bridge_width: 10.0,
            careful_extrude_feed: 1800.0,
            rapid_extrude_feed: 3000.0,
            travel_feed: 9000.0,
            z_feed: 600.0,
            outer_shell_feed_multiplier: 0.5,
            support_feed_multiplier: 0.9,
            bridge_feed_multiplier: 0.5,
            min_layer_time: 5.0,
            min_feed_multiplier: 0.25,
        }
    }
}

impl PrintSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("layer_height", self.layer_height),
            ("nozzle_diameter", self.nozzle_diameter),
            ("filament_diameter", self.filament_diameter),
            ("path_width_multiplier", self.path_width_multiplier),
            ("solid_fill_spacing_multiplier", self.solid_fill_spacing_multiplier),
            ("sparse_infill_spacing_multiplier", self.sparse_infill_spacing_multiplier),
            ("support_spacing_multiplier", self.support_spacing_multiplier),
            ("careful_extrude_feed", self.careful_extrude_feed),
            ("rapid_extrude_feed", self.rapid_extrude_feed),
            ("travel_feed", self.travel_feed),
            ("z_feed", self.z_feed),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(SlicerError::InvalidSettings(format!("{name} must be positive")));
            }
        }
        if self.layer_height > self.nozzle_diameter {
            return Err(SlicerError::InvalidSettings(
                "layer_height must not exceed nozzle_diameter".into(),
            ));
        }
        if self.open_path_width.is_some_and(|w| w <= 0.0) {
            return Err(SlicerError::InvalidSettings(
                "open_path_width must be positive".into(),
            ));
        }
        if !(0.0..90.0).contains(&self.support_overhang_angle) {
            return Err(SlicerError::InvalidSettings(
                "support_overhang_angle must be in [0, 90)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_feed_multiplier) || self.min_feed_multiplier == 0.0 {
            return Err(SlicerError::InvalidSettings(
                "min_feed_multiplier must be in (0, 1]".into(),
            ));
        }
        if let Some(range) = self.layer_range {
            if range.first > range.last {
                return Err(SlicerError::InvalidSettings(
                    "layer_range.first must not exceed layer_range.last".into(),
                ));
            }
        }
        Ok(())
    }

    /// Extrusion width.
    pub fn path_width(&self) -> f64 {
        self.nozzle_diameter * self.path_width_multiplier
    }

    /// Distance between adjacent shells.
    pub fn shell_spacing(&self) -> f64 {
        self.path_width()
    }

    /// Solid fill line spacing.
    pub fn solid_fill_spacing(&self) -> f64 {
        self.path_width() * self.solid_fill_spacing_multiplier
    }

    /// Sparse infill line spacing.
    pub fn sparse_fill_spacing(&self) -> f64 {
        self.path_width() * self.sparse_infill_spacing_multiplier
    }

    /// Support line spacing.
    pub fn support_spacing(&self) -> f64 {
        self.path_width() * self.support_spacing_multiplier
    }

    /// Horizontal distance a layer may overhang the one below unsupported.
    pub fn overhang_distance(&self) -> f64 {
        let angle = self.support_overhang_angle.to_radians();
        if angle <= 0.0 {
            return f64::MAX;
        }
        self.layer_height / angle.tan()
    }

    /// Fill angle for layer `index`.
    pub fn infill_angle(&self, index: usize) -> f64 {
        if self.infill_angles.is_empty() {
            return 45.0;
        }
        self.infill_angles[index % self.infill_angles.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        PrintSettings::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_settings() {
        let settings = PrintSettings {
            layer_height: -0.1,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(SlicerError::InvalidSettings(_))));

        let settings = PrintSettings {
            layer_range: Some(LayerRange { first: 5, last: 2 }),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_overhang_distance() {
        let settings = PrintSettings {
            support_overhang_angle: 45.0,
            ..Default::default()
        };
        assert!((settings.overhang_distance() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_toml_partial_config_uses_defaults() {
        let settings: PrintSettings = toml::from_str(
            r#"
            layer_height = 0.3
            generate_support = true
            infill_angles = [0.0, 90.0]
            "#,
        )
        .unwrap();
        assert!((settings.layer_height - 0.3).abs() < 1e-12);
        assert!(settings.generate_support);
        assert_eq!(settings.shell_count, 2);
        assert!((settings.infill_angle(3) - 90.0).abs() < 1e-12);
    }
}
