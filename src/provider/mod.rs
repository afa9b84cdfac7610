pub mod cache;
pub mod procedural;
pub mod raster;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::grid::cell::GeoCoordinate;

pub use cache::{CacheError, CachedProvider};
pub use procedural::ProceduralProvider;
pub use raster::RasterProvider;

// === Attributes ===

/// Ground cover reported for a coordinate. Only vegetated ground can burn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Surface {
    #[default]
    Vegetation,
    Water,
    Barren,
}

impl Surface {
    pub fn is_combustible(self) -> bool {
        self == Surface::Vegetation
    }
}

/// Environmental attributes of one coordinate, fetched once per cell at grid build.
///
/// Units: elevation in metres, fuel load as tree cover percent (0-100),
/// temperature in °C, relative humidity percent (0-100), wind direction in
/// degrees the wind blows *from* (0 = north, 90 = east), wind speed in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalAttributes {
    pub elevation: f64,
    pub fuel_load: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_direction: f64,
    pub wind_speed: f64,
    #[serde(default)]
    pub surface: Surface,
    /// An active-fire detection was reported here, used to score a simulated burn.
    #[serde(default)]
    pub observed_fire: bool,
}

impl EnvironmentalAttributes {
    /// Check physical ranges. All violations are reported together.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        let fields = [
            ("elevation", self.elevation),
            ("fuel_load", self.fuel_load),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("wind_direction", self.wind_direction),
            ("wind_speed", self.wind_speed),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                errors.push(format!("{} must be finite, got {}", name, value));
            }
        }

        if !(0.0..=100.0).contains(&self.fuel_load) {
            errors.push(format!("fuel_load must be 0-100, got {}", self.fuel_load));
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            errors.push(format!("humidity must be 0-100, got {}", self.humidity));
        }
        if self.wind_speed < 0.0 {
            errors.push(format!("wind_speed must be >= 0, got {}", self.wind_speed));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    pub fn is_combustible(&self) -> bool {
        self.surface.is_combustible()
    }
}

// === Errors ===

/// Failure to obtain attributes for a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider has no data for this coordinate.
    NotFound { latitude: f64, longitude: f64 },
    /// The provider could not be reached or failed internally.
    Unavailable(String),
    /// The provider answered with a record that fails range checks.
    Invalid {
        latitude: f64,
        longitude: f64,
        reason: String,
    },
}

impl ProviderError {
    pub fn not_found(coordinate: GeoCoordinate) -> Self {
        ProviderError::NotFound {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::NotFound {
                latitude,
                longitude,
            } => write!(f, "No attributes for ({:.6}, {:.6})", latitude, longitude),
            ProviderError::Unavailable(reason) => write!(f, "Provider unavailable: {}", reason),
            ProviderError::Invalid {
                latitude,
                longitude,
                reason,
            } => write!(
                f,
                "Invalid attributes for ({:.6}, {:.6}): {}",
                latitude, longitude, reason
            ),
        }
    }
}

impl std::error::Error for ProviderError {}

// === Provider trait ===

/// Source of per-coordinate environmental attributes.
///
/// Implementations must be idempotent: fetching the same coordinate twice
/// yields the same record. Caching and batching strategy are the provider's
/// concern; grid construction only calls [`EnvironmentProvider::fetch_batch`].
pub trait EnvironmentProvider {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError>;

    /// Fetch many coordinates at once. Results are returned in input order.
    fn fetch_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
        coordinates
            .iter()
            .map(|&c| self.fetch_attributes(c))
            .collect()
    }
}

/// Fetch through [`EnvironmentProvider::fetch_batch`], returning exactly one
/// result per coordinate.
///
/// Results a provider failed to return become `Unavailable`; surplus ones are dropped.
pub fn fetch_all<P: EnvironmentProvider + ?Sized>(
    provider: &P,
    coordinates: &[GeoCoordinate],
) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
    let mut results = provider.fetch_batch(coordinates);
    let returned = results.len();
    if returned != coordinates.len() {
        warn!(
            expected = coordinates.len(),
            returned, "Provider batch does not match the requested coordinates"
        );
        results.truncate(coordinates.len());
        results.resize_with(coordinates.len(), || {
            Err(ProviderError::Unavailable(format!(
                "batch returned {} of {} records",
                returned,
                coordinates.len()
            )))
        });
    }
    results
}

impl<P: EnvironmentProvider + ?Sized> EnvironmentProvider for &P {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        (**self).fetch_attributes(coordinate)
    }

    fn fetch_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
        (**self).fetch_batch(coordinates)
    }
}

impl<P: EnvironmentProvider + ?Sized> EnvironmentProvider for Box<P> {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        (**self).fetch_attributes(coordinate)
    }

    fn fetch_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
        (**self).fetch_batch(coordinates)
    }
}

/// Same attributes everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformProvider(pub EnvironmentalAttributes);

impl EnvironmentProvider for UniformProvider {
    fn fetch_attributes(
        &self,
        _coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        Ok(self.0)
    }
}

/// Provider backed by a plain function of the coordinate.
pub struct FnProvider<F>(F);

/// Wrap a function as an [`EnvironmentProvider`].
pub fn from_fn<F>(f: F) -> FnProvider<F>
where
    F: Fn(GeoCoordinate) -> Result<EnvironmentalAttributes, ProviderError>,
{
    FnProvider(f)
}

impl<F> EnvironmentProvider for FnProvider<F>
where
    F: Fn(GeoCoordinate) -> Result<EnvironmentalAttributes, ProviderError>,
{
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        (self.0)(coordinate)
    }
}
