//! Printer profiles.

use serde::{Deserialize, Serialize};
use strata_math::Point3;
use strata_slicer::PrintSettings;

/// Printable box, `[0, x] × [0, y] × [0, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildVolume {
    /// Bed width (mm).
    pub x: f64,
    /// Bed depth (mm).
    pub y: f64,
    /// Maximum height (mm).
    pub z: f64,
}

impl BuildVolume {
    /// Does the volume contain `p`? Boundaries count as inside.
    pub fn contains(&self, p: &Point3) -> bool {
        (0.0..=self.x).contains(&p.x) && (0.0..=self.y).contains(&p.y) && (0.0..=self.z).contains(&p.z)
    }

    /// Bed centre at height zero.
    pub fn bed_center(&self) -> Point3 {
        Point3::new(self.x / 2.0, self.y / 2.0, 0.0)
    }
}

/// Filament retraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Retraction {
    /// Filament pulled back (mm).
    pub distance: f64,
    /// Filament feed while retracting (mm/min).
    pub feed: f64,
    /// Travels shorter than this are made without retracting (mm).
    pub min_travel: f64,
}

/// Machine-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterProfile {
    /// Lookup key, e.g. `"ender3"`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Printable volume.
    pub volume: BuildVolume,
    /// Whether the bed can be heated.
    pub heated_bed: bool,
    /// Nozzle diameter (mm).
    pub nozzle_diameter: f64,
    /// Filament diameter (mm).
    pub filament_diameter: f64,
    /// Fastest XY feed (mm/min).
    pub max_feed_xy: f64,
    /// Fastest Z feed (mm/min).
    pub max_feed_z: f64,
    /// Retraction behaviour.
    pub retraction: Retraction,
    /// Default nozzle temperature (°C).
    pub print_temperature: f64,
    /// Default bed temperature (°C).
    pub bed_temperature: f64,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl PrinterProfile {
    /// Generic 220 mm bed-slinger.
    pub fn generic() -> Self {
        Self {
            id: "generic".into(),
            name: "Generic".into(),
            volume: BuildVolume {
                x: 220.0,
                y: 220.0,
                z: 250.0,
            },
            heated_bed: true,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_feed_xy: 30000.0,
            max_feed_z: 600.0,
            retraction: Retraction {
                distance: 5.0,
                feed: 2700.0,
                min_travel: 2.0,
            },
            print_temperature: 210.0,
            bed_temperature: 60.0,
        }
    }

    /// Creality Ender 3.
    pub fn ender3() -> Self {
        Self {
            id: "ender3".into(),
            name: "Creality Ender 3".into(),
            max_feed_z: 300.0,
            print_temperature: 200.0,
            ..Self::generic()
        }
    }

    /// Prusa MK4.
    pub fn prusa_mk4() -> Self {
        Self {
            id: "prusa_mk4".into(),
            name: "Prusa MK4".into(),
            volume: BuildVolume {
                x: 250.0,
                y: 210.0,
                z: 220.0,
            },
            max_feed_xy: 12000.0,
            max_feed_z: 720.0,
            retraction: Retraction {
                distance: 0.8,
                feed: 2100.0,
                min_travel: 1.5,
            },
            print_temperature: 215.0,
            ..Self::generic()
        }
    }

    /// Voron 2.4, 350 mm.
    pub fn voron_24() -> Self {
        Self {
            id: "voron_24".into(),
            name: "Voron 2.4 (350mm)".into(),
            volume: BuildVolume {
                x: 350.0,
                y: 350.0,
                z: 340.0,
            },
            max_feed_xy: 18000.0,
            max_feed_z: 900.0,
            retraction: Retraction {
                distance: 0.5,
                feed: 1800.0,
                min_travel: 1.0,
            },
            print_temperature: 240.0,
            bed_temperature: 110.0,
            ..Self::generic()
        }
    }

    /// All built-in profiles.
    pub fn all_profiles() -> Vec<Self> {
        vec![Self::generic(), Self::ender3(), Self::prusa_mk4(), Self::voron_24()]
    }

    /// Built-in profile by `id`.
    pub fn by_id(id: &str) -> Option<Self> {
        Self::all_profiles().into_iter().find(|p| p.id == id)
    }

    /// Check if a position is within the build volume.
    pub fn in_bounds(&self, x: f64, y: f64, z: f64) -> bool {
        self.volume.contains(&Point3::new(x, y, z))
    }

    /// `print` with this machine's nozzle and filament diameters.
    pub fn print_settings(&self, print: &PrintSettings) -> PrintSettings {
        PrintSettings {
            nozzle_diameter: self.nozzle_diameter,
            filament_diameter: self.filament_diameter,
            ..print.clone()
        }
    }
}
