use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::grid::{BoundingBox, GridPosition, GridSpec};

/// Parameters of the noise-driven terrain provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralParams {
    /// 0 picks a random seed.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_base_elevation")]
    pub base_elevation: f64,
    /// Metres of elevation swing around `base_elevation`.
    #[serde(default = "default_relief")]
    pub relief: f64,
    /// Noise cycles per degree.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Elevation noise (-1..1) below which ground is open water.
    #[serde(default = "default_water_level")]
    pub water_level: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_humidity")]
    pub humidity: f64,
    #[serde(default = "default_wind_direction")]
    pub wind_direction: f64,
    #[serde(default = "default_wind_speed")]
    pub wind_speed: f64,
    /// Degrees the local wind direction may drift from `wind_direction`.
    #[serde(default = "default_wind_variability")]
    pub wind_variability: f64,
    #[serde(default = "default_fuel_mean")]
    pub fuel_mean: f64,
    #[serde(default = "default_fuel_spread")]
    pub fuel_spread: f64,
    /// Synthetic active-fire detection to score runs against.
    #[serde(default)]
    pub observed_fire: Option<ObservedFire>,
}

/// Circular footprint of a reported fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedFire {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres.
    pub radius: f64,
}

fn default_base_elevation() -> f64 {
    300.0
}
fn default_relief() -> f64 {
    150.0
}
fn default_frequency() -> f64 {
    150.0
}
fn default_water_level() -> f64 {
    -0.6
}
fn default_temperature() -> f64 {
    30.0
}
fn default_humidity() -> f64 {
    25.0
}
fn default_wind_direction() -> f64 {
    270.0
}
fn default_wind_speed() -> f64 {
    4.0
}
fn default_wind_variability() -> f64 {
    20.0
}
fn default_fuel_mean() -> f64 {
    60.0
}
fn default_fuel_spread() -> f64 {
    30.0
}

impl Default for ProceduralParams {
    fn default() -> Self {
        ProceduralParams {
            seed: 0,
            base_elevation: default_base_elevation(),
            relief: default_relief(),
            frequency: default_frequency(),
            water_level: default_water_level(),
            temperature: default_temperature(),
            humidity: default_humidity(),
            wind_direction: default_wind_direction(),
            wind_speed: default_wind_speed(),
            wind_variability: default_wind_variability(),
            fuel_mean: default_fuel_mean(),
            fuel_spread: default_fuel_spread(),
            observed_fire: None,
        }
    }
}

/// Where cell attributes come from.
///
/// Uses a flat struct (not a tagged enum) so a partial `[provider]` table still parses.
/// `mode` is "procedural" (default) or "raster".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    /// JSON raster file, required in raster mode.
    #[serde(default)]
    pub raster_path: Option<String>,
    /// Bincode attribute cache, loaded before and saved after grid construction.
    #[serde(default)]
    pub cache_path: Option<String>,
    #[serde(default)]
    pub procedural: ProceduralParams,
}

fn default_mode() -> String {
    "procedural".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            mode: default_mode(),
            raster_path: None,
            cache_path: None,
            procedural: ProceduralParams::default(),
        }
    }
}

impl ProviderConfig {
    pub fn is_raster(&self) -> bool {
        self.mode == "raster"
    }
}

/// Area to simulate and where to light it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainParams {
    pub rows: u32,
    pub cols: u32,
    /// Metres per grid step.
    pub scale: f64,
    pub bounds: BoundingBox,
    /// Default ignition points as `[row, col]` pairs.
    #[serde(default)]
    pub ignition: Vec<[u32; 2]>,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl TerrainParams {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let params: TerrainParams =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            rows: self.rows,
            cols: self.cols,
            bounds: self.bounds,
            scale: self.scale,
        }
    }

    pub fn ignition_points(&self) -> Vec<GridPosition> {
        self.ignition
            .iter()
            .map(|&[row, col]| GridPosition::new(row, col))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.rows == 0 || self.cols == 0 {
            errors.push(format!(
                "rows and cols must be > 0, got {}x{}. Example: rows = 100",
                self.rows, self.cols
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            errors.push(format!(
                "scale must be > 0.0 metres, got {}. Example: scale = 30.0",
                self.scale
            ));
        }
        if let Err(e) = self.bounds.validate() {
            errors.push(e);
        }
        for &[row, col] in &self.ignition {
            if row >= self.rows || col >= self.cols {
                errors.push(format!(
                    "ignition point [{}, {}] is outside the {}x{} grid",
                    row, col, self.rows, self.cols
                ));
            }
        }

        let provider = &self.provider;
        if provider.mode != "procedural" && provider.mode != "raster" {
            errors.push(format!(
                "provider.mode must be 'procedural' or 'raster', got '{}'",
                provider.mode
            ));
        }
        if provider.is_raster() && provider.raster_path.is_none() {
            errors.push(
                "provider.raster_path is required in raster mode. Example: raster_path = \"terrain.json\""
                    .to_string(),
            );
        }

        let p = &provider.procedural;
        if !p.frequency.is_finite() || p.frequency <= 0.0 {
            errors.push(format!(
                "provider.procedural.frequency must be > 0.0, got {}. Example: frequency = 150.0",
                p.frequency
            ));
        }
        if p.relief < 0.0 {
            errors.push(format!(
                "provider.procedural.relief must be >= 0.0, got {}",
                p.relief
            ));
        }
        if !(0.0..=100.0).contains(&p.humidity) {
            errors.push(format!(
                "provider.procedural.humidity must be 0-100, got {}",
                p.humidity
            ));
        }
        if !(0.0..=100.0).contains(&p.fuel_mean) {
            errors.push(format!(
                "provider.procedural.fuel_mean must be 0-100, got {}",
                p.fuel_mean
            ));
        }
        if p.wind_speed < 0.0 {
            errors.push(format!(
                "provider.procedural.wind_speed must be >= 0.0, got {}",
                p.wind_speed
            ));
        }
        if let Some(fire) = &p.observed_fire {
            if !fire.radius.is_finite() || fire.radius <= 0.0 {
                errors.push(format!(
                    "provider.procedural.observed_fire.radius must be > 0.0 metres, got {}. Example: radius = 400.0",
                    fire.radius
                ));
            }
            if !(-90.0..=90.0).contains(&fire.latitude)
                || !(-180.0..=180.0).contains(&fire.longitude)
            {
                errors.push(format!(
                    "provider.procedural.observed_fire must be a valid coordinate, got ({}, {})",
                    fire.latitude, fire.longitude
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
