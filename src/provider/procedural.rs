use noise::{NoiseFn, Perlin};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::terrain::ProceduralParams;
use crate::grid::cell::GeoCoordinate;
use crate::grid::geodesy::{haversine_distance, normalize_degrees};
use crate::provider::{EnvironmentProvider, EnvironmentalAttributes, ProviderError, Surface};

/// Standard atmosphere lapse rate, °C per metre of climb.
const LAPSE_RATE: f64 = 0.0065;

/// Synthetic terrain and weather sampled from seeded Perlin noise.
///
/// Stands in for a remote geospatial service: every coordinate gets an
/// elevation, tree cover and local weather, and low-lying noise below
/// `water_level` becomes open water.
pub struct ProceduralProvider {
    params: ProceduralParams,
    elevation: Perlin,
    fuel: Perlin,
    wind: Perlin,
}

impl ProceduralProvider {
    /// If `params.seed` is 0, a random seed is chosen. The resolved seed is
    /// available from [`ProceduralProvider::seed`] for reproducibility.
    pub fn new(params: &ProceduralParams) -> Self {
        let seed = if params.seed == 0 {
            rand::thread_rng().r#gen()
        } else {
            params.seed
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        ProceduralProvider {
            params: ProceduralParams {
                seed,
                ..params.clone()
            },
            elevation: Perlin::new(rng.r#gen()),
            fuel: Perlin::new(rng.r#gen()),
            wind: Perlin::new(rng.r#gen()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }

    pub fn params(&self) -> &ProceduralParams {
        &self.params
    }

    fn sample(&self, noise: &Perlin, coordinate: GeoCoordinate, frequency: f64) -> f64 {
        noise
            .get([
                coordinate.latitude * frequency,
                coordinate.longitude * frequency,
            ])
            .clamp(-1.0, 1.0)
    }
}

impl EnvironmentProvider for ProceduralProvider {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        if !coordinate.latitude.is_finite() || !coordinate.longitude.is_finite() {
            return Err(ProviderError::not_found(coordinate));
        }
        let p = &self.params;

        let e = self.sample(&self.elevation, coordinate, p.frequency);
        let elevation = p.base_elevation + e * p.relief;
        let surface = if e < p.water_level {
            Surface::Water
        } else {
            Surface::Vegetation
        };

        // Finer detail for vegetation than for relief.
        let f = self.sample(&self.fuel, coordinate, p.frequency * 2.0);
        let fuel_load = match surface {
            Surface::Vegetation => (p.fuel_mean + f * p.fuel_spread).clamp(0.0, 100.0),
            _ => 0.0,
        };

        let w = self.sample(&self.wind, coordinate, p.frequency * 0.5);
        let wind_direction = normalize_degrees(p.wind_direction + w * p.wind_variability);

        let temperature = p.temperature - LAPSE_RATE * (elevation - p.base_elevation);

        let observed_fire = surface.is_combustible()
            && p.observed_fire.is_some_and(|fire| {
                let centre = GeoCoordinate::new(fire.latitude, fire.longitude);
                haversine_distance(centre, coordinate) <= fire.radius
            });

        Ok(EnvironmentalAttributes {
            elevation,
            fuel_load,
            temperature,
            humidity: p.humidity,
            wind_direction,
            wind_speed: p.wind_speed,
            surface,
            observed_fire,
        })
    }

    fn fetch_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
        coordinates
            .par_iter()
            .map(|&c| self.fetch_attributes(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::terrain::ObservedFire;

    fn params() -> ProceduralParams {
        ProceduralParams {
            seed: 42,
            ..ProceduralParams::default()
        }
    }

    fn coords() -> Vec<GeoCoordinate> {
        (0..50)
            .map(|i| GeoCoordinate::new(44.0 - i as f64 * 0.0013, 5.0 + i as f64 * 0.0021))
            .collect()
    }

    #[test]
    fn same_seed_same_attributes() {
        let a = ProceduralProvider::new(&params());
        let b = ProceduralProvider::new(&params());
        for c in coords() {
            assert_eq!(a.fetch_attributes(c).unwrap(), b.fetch_attributes(c).unwrap());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = ProceduralProvider::new(&params());
        let b = ProceduralProvider::new(&ProceduralParams {
            seed: 7,
            ..params()
        });
        let differs = coords()
            .into_iter()
            .any(|c| a.fetch_attributes(c).unwrap() != b.fetch_attributes(c).unwrap());
        assert!(differs);
    }

    #[test]
    fn seed_zero_resolves_to_random_seed() {
        let provider = ProceduralProvider::new(&ProceduralParams {
            seed: 0,
            ..params()
        });
        let replay = ProceduralProvider::new(&ProceduralParams {
            seed: provider.seed(),
            ..params()
        });
        let c = GeoCoordinate::new(44.01, 5.02);
        assert_eq!(
            provider.fetch_attributes(c).unwrap(),
            replay.fetch_attributes(c).unwrap()
        );
    }

    #[test]
    fn attributes_are_valid() {
        let provider = ProceduralProvider::new(&params());
        for c in coords() {
            let attrs = provider.fetch_attributes(c).unwrap();
            assert!(attrs.validate().is_ok(), "{:?}", attrs);
        }
    }

    #[test]
    fn water_level_above_all_noise_floods_everything() {
        let provider = ProceduralProvider::new(&ProceduralParams {
            water_level: 2.0,
            ..params()
        });
        for c in coords() {
            let attrs = provider.fetch_attributes(c).unwrap();
            assert_eq!(attrs.surface, Surface::Water);
            assert_eq!(attrs.fuel_load, 0.0);
        }
    }

    #[test]
    fn batch_matches_single_fetches() {
        let provider = ProceduralProvider::new(&params());
        let cs = coords();
        let batch = provider.fetch_batch(&cs);
        for (c, r) in cs.iter().zip(batch) {
            assert_eq!(r.unwrap(), provider.fetch_attributes(*c).unwrap());
        }
    }

    #[test]
    fn non_finite_coordinate_not_found() {
        let provider = ProceduralProvider::new(&params());
        assert!(matches!(
            provider.fetch_attributes(GeoCoordinate::new(f64::NAN, 0.0)),
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[test]
    fn observed_fire_marks_vegetation_inside_footprint() {
        let centre = GeoCoordinate::new(44.0, 5.0);
        let provider = ProceduralProvider::new(&ProceduralParams {
            water_level: -2.0,
            observed_fire: Some(ObservedFire {
                latitude: centre.latitude,
                longitude: centre.longitude,
                radius: 500.0,
            }),
            ..params()
        });
        assert!(provider.fetch_attributes(centre).unwrap().observed_fire);
        // ~0.01° of latitude is over a kilometre away.
        let outside = GeoCoordinate::new(44.01, 5.0);
        assert!(!provider.fetch_attributes(outside).unwrap().observed_fire);
    }

    #[test]
    fn no_footprint_means_no_detections() {
        let provider = ProceduralProvider::new(&params());
        assert!(coords()
            .into_iter()
            .all(|c| !provider.fetch_attributes(c).unwrap().observed_fire));
    }
}
