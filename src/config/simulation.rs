use serde::Deserialize;
use std::path::Path;

use crate::simulation::combustion::CombustionParams;
use crate::simulation::RunOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_temperature_coefficient")]
    pub temperature_coefficient: f64,
    #[serde(default = "default_wind_speed_coefficient")]
    pub wind_speed_coefficient: f64,
    #[serde(default = "default_humidity_coefficient")]
    pub humidity_coefficient: f64,
    #[serde(default = "default_base_offset")]
    pub base_offset: f64,
    #[serde(default = "default_wind_exponent")]
    pub wind_exponent: f64,
    #[serde(default = "default_slope_exponent")]
    pub slope_exponent: f64,
    #[serde(default = "default_normalization")]
    pub normalization: f64,
    #[serde(default = "default_precision")]
    pub precision: f64,
    #[serde(default = "default_max_spread_rate")]
    pub max_spread_rate: f64,
    #[serde(default = "default_burnout_ticks")]
    pub burnout_ticks: u32,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_snapshot_directory")]
    pub snapshot_directory: String,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u32,
}

fn default_temperature_coefficient() -> f64 {
    0.03
}
fn default_wind_speed_coefficient() -> f64 {
    0.05
}
fn default_humidity_coefficient() -> f64 {
    0.01
}
fn default_base_offset() -> f64 {
    0.3
}
fn default_wind_exponent() -> f64 {
    0.1783
}
fn default_slope_exponent() -> f64 {
    3.553
}
fn default_normalization() -> f64 {
    0.13
}
fn default_precision() -> f64 {
    0.05
}
fn default_max_spread_rate() -> f64 {
    1.0
}
fn default_burnout_ticks() -> u32 {
    240
}
fn default_decay_rate() -> f64 {
    0.05
}
fn default_max_iterations() -> u64 {
    1600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_snapshot_directory() -> String {
    "./snapshots".to_string()
}
fn default_max_snapshots() -> u32 {
    10
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            temperature_coefficient: default_temperature_coefficient(),
            wind_speed_coefficient: default_wind_speed_coefficient(),
            humidity_coefficient: default_humidity_coefficient(),
            base_offset: default_base_offset(),
            wind_exponent: default_wind_exponent(),
            slope_exponent: default_slope_exponent(),
            normalization: default_normalization(),
            precision: default_precision(),
            max_spread_rate: default_max_spread_rate(),
            burnout_ticks: default_burnout_ticks(),
            decay_rate: default_decay_rate(),
            max_iterations: default_max_iterations(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            snapshot_directory: default_snapshot_directory(),
            max_snapshots: default_max_snapshots(),
        }
    }
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    /// Like [`SimulationConfig::from_file`], but a missing file yields the defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(SimulationConfig::default())
        }
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: SimulationConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn combustion(&self) -> CombustionParams {
        CombustionParams {
            temperature_coefficient: self.temperature_coefficient,
            wind_speed_coefficient: self.wind_speed_coefficient,
            humidity_coefficient: self.humidity_coefficient,
            base_offset: self.base_offset,
            wind_exponent: self.wind_exponent,
            slope_exponent: self.slope_exponent,
            normalization: self.normalization,
            precision: self.precision,
            max_spread_rate: self.max_spread_rate,
            burnout_ticks: self.burnout_ticks,
            decay_rate: self.decay_rate,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(self.max_iterations)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if let Err(combustion) = self.combustion().validate() {
            errors.extend(combustion.lines().map(str::to_string));
        }

        if self.max_iterations == 0 {
            errors.push(format!(
                "max_iterations must be > 0, got {}. Example: max_iterations = 1600",
                self.max_iterations
            ));
        }

        if self.max_snapshots == 0 {
            errors.push(format!(
                "max_snapshots must be > 0, got {}. Example: max_snapshots = 10",
                self.max_snapshots
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            errors.push(format!(
                "log_format must be one of {:?}, got '{}'. Example: log_format = \"text\"",
                valid_formats, self.log_format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
