//! TOML job configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strata_slicer::PrintSettings;
use strata_toolpath::{JobSettings, PrinterProfile};

/// Contents of a `strata.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Built-in printer profile id.
    pub profile: Option<String>,
    /// Full custom printer profile; wins over `profile`.
    pub printer: Option<PrinterProfile>,
    /// Slicing and path settings.
    pub print: PrintSettings,
    /// Instruction-stream settings.
    pub job: JobSettings,
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config.print.validate()?;
        Ok(config)
    }

    /// Printer to target; `override_id` beats the file.
    pub fn printer(&self, override_id: Option<&str>) -> Result<PrinterProfile> {
        if let Some(id) = override_id {
            return PrinterProfile::by_id(id).with_context(|| format!("unknown printer profile {id:?}"));
        }
        if let Some(printer) = &self.printer {
            return Ok(printer.clone());
        }
        match &self.profile {
            Some(id) => PrinterProfile::by_id(id).with_context(|| format!("unknown printer profile {id:?}")),
            None => Ok(PrinterProfile::default()),
        }
    }

    /// Print settings for `printer`, with its nozzle and filament diameters.
    pub fn print_for(&self, printer: &PrinterProfile) -> Result<PrintSettings> {
        let print = printer.print_settings(&self.print);
        print
            .validate()
            .with_context(|| format!("print settings for printer {:?}", printer.id))?;
        Ok(print)
    }

    /// Defaults as TOML.
    pub fn default_toml() -> Result<String> {
        let config = Config {
            profile: Some(PrinterProfile::default().id),
            ..Default::default()
        };
        Ok(toml::to_string_pretty(&config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "profile = \"prusa_mk4\"\n[print]\nlayer_height = 0.15\ngenerate_support = true\n[job]\nfan_start_layer = 3"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.print.layer_height, 0.15);
        assert!(config.print.generate_support);
        assert_eq!(config.print.shell_count, PrintSettings::default().shell_count);
        assert_eq!(config.job.fan_start_layer, 3);
        assert_eq!(config.printer(None).unwrap().id, "prusa_mk4");
        assert_eq!(config.printer(Some("voron_24")).unwrap().id, "voron_24");
        assert!(config.printer(Some("unknown")).is_err());
    }

    #[test]
    fn test_custom_printer_diameters_reach_print_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[print]
layer_height = 0.3
filament_diameter = 1.75

[printer]
id = "big"
name = "Big nozzle"
heated_bed = false
nozzle_diameter = 0.8
filament_diameter = 2.85
max_feed_xy = 9000.0
max_feed_z = 300.0
print_temperature = 230.0
bed_temperature = 0.0

[printer.volume]
x = 300.0
y = 300.0
z = 400.0

[printer.retraction]
distance = 2.0
feed = 1800.0
min_travel = 2.0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        let printer = config.printer(None).unwrap();
        assert_eq!(printer.id, "big");
        let print = config.print_for(&printer).unwrap();
        assert_eq!(print.nozzle_diameter, 0.8);
        assert_eq!(print.filament_diameter, 2.85);
        assert_eq!(print.layer_height, 0.3);

        let small = PrinterProfile {
            nozzle_diameter: 0.25,
            ..PrinterProfile::generic()
        };
        assert!(config.print_for(&small).is_err());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[print]\nlayer_height = -1.0").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_defaults_round_trip() {
        let text = Config::default_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.print, PrintSettings::default());
        assert_eq!(parsed.job, JobSettings::default());
    }
}
