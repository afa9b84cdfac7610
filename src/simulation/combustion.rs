//! Per-cell combustion-rate model.
//!
//! A burning source heats an unburned target at an effective rate
//!
//! `r = r0(source) · k_φ · k_θ · k_s(target)² · c_norm`
//!
//! where `k_φ = exp(c_φ · v · cos φ)` rewards spread downwind,
//! `k_θ = exp(c_θ · θ)` rewards spread uphill and `k_s = ((fuel + 30) / 100)³`
//! grows with vegetation density. Each tick the target gains `r · Δt / scale`
//! intensity from every burning neighbour.

use serde::{Deserialize, Serialize};

use crate::grid::cell::Cell;
use crate::grid::geodesy::{haversine_distance, initial_bearing};
use crate::provider::EnvironmentalAttributes;

/// Minimum combustibility baseline added to the fuel load.
pub const FUEL_FLOOR: f64 = 30.0;

/// Wind speed (m/s) the effective-wind term is normalised by.
const WIND_REFERENCE: f64 = 0.836;

/// Calibration constants of the combustion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombustionParams {
    pub temperature_coefficient: f64,
    pub wind_speed_coefficient: f64,
    pub humidity_coefficient: f64,
    pub base_offset: f64,
    /// c_φ
    pub wind_exponent: f64,
    /// c_θ
    pub slope_exponent: f64,
    /// c_norm
    pub normalization: f64,
    /// Dimensionless time-step factor: one tick lasts `precision · scale / max_spread_rate` minutes.
    pub precision: f64,
    /// Metres per minute.
    pub max_spread_rate: f64,
    /// Ticks a cell burns at full intensity before it starts decaying.
    pub burnout_ticks: u32,
    /// Intensity lost per tick while decaying.
    pub decay_rate: f64,
}

impl Default for CombustionParams {
    fn default() -> Self {
        CombustionParams {
            temperature_coefficient: 0.03,
            wind_speed_coefficient: 0.05,
            humidity_coefficient: 0.01,
            base_offset: 0.3,
            wind_exponent: 0.1783,
            slope_exponent: 3.553,
            normalization: 0.13,
            precision: 0.05,
            max_spread_rate: 1.0,
            burnout_ticks: 240,
            decay_rate: 0.05,
        }
    }
}

impl CombustionParams {
    /// Check every constant is usable, reporting all violations one per line.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        let coefficients = [
            ("temperature_coefficient", self.temperature_coefficient, "0.03"),
            ("wind_speed_coefficient", self.wind_speed_coefficient, "0.05"),
            ("humidity_coefficient", self.humidity_coefficient, "0.01"),
            ("base_offset", self.base_offset, "0.3"),
            ("wind_exponent", self.wind_exponent, "0.1783"),
            ("slope_exponent", self.slope_exponent, "3.553"),
        ];
        for (name, value, example) in coefficients {
            if !value.is_finite() {
                errors.push(format!(
                    "{} must be a finite number, got {}. Example: {} = {}",
                    name, value, name, example
                ));
            }
        }

        let positive = [
            ("normalization", self.normalization, "0.13"),
            ("precision", self.precision, "0.05"),
            ("max_spread_rate", self.max_spread_rate, "1.0"),
        ];
        for (name, value, example) in positive {
            if !value.is_finite() || value <= 0.0 {
                errors.push(format!(
                    "{} must be > 0.0, got {}. Example: {} = {}",
                    name, value, name, example
                ));
            }
        }

        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            errors.push(format!(
                "decay_rate must be in (0.0, 1.0], got {}. Example: decay_rate = 0.05",
                self.decay_rate
            ));
        }

        if self.burnout_ticks == 0 {
            errors.push(format!(
                "burnout_ticks must be > 0, got {}. Example: burnout_ticks = 240",
                self.burnout_ticks
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }

    /// Simulated minutes per tick for a grid of the given scale.
    pub fn tick_minutes(&self, scale_m: f64) -> f64 {
        self.precision * scale_m / self.max_spread_rate
    }
}

/// Vegetation fuel factor `k_s`.
pub fn fuel_factor(fuel_load: f64) -> f64 {
    ((fuel_load + FUEL_FLOOR) / 100.0).powi(3)
}

/// Effective wind term of the base rate.
pub fn effective_wind(wind_speed: f64) -> f64 {
    (wind_speed.max(0.0) / WIND_REFERENCE).powf(2.0 / 3.0)
}

/// Spread rate with no wind alignment or slope assistance, never negative.
pub fn base_rate(attributes: &EnvironmentalAttributes, params: &CombustionParams) -> f64 {
    let r0 = params.temperature_coefficient * attributes.temperature
        + params.wind_speed_coefficient * effective_wind(attributes.wind_speed)
        + params.humidity_coefficient * (100.0 - attributes.humidity)
        - params.base_offset;
    r0.max(0.0)
}

/// Slope angle in radians; positive uphill. Degenerate distances give zero slope.
pub fn slope_angle(elevation_delta: f64, distance: f64) -> f64 {
    if !distance.is_finite() || distance <= f64::EPSILON || !elevation_delta.is_finite() {
        return 0.0;
    }
    (elevation_delta / distance).atan()
}

pub fn slope_factor(angle: f64, params: &CombustionParams) -> f64 {
    (params.slope_exponent * angle).exp()
}

/// Angle between the wind and the spread direction, in radians.
///
/// `wind_direction` is where the wind blows from; `bearing` points from the
/// source toward the target. Zero means the wind carries fire straight at the target.
pub fn wind_alignment(wind_direction: f64, bearing: f64) -> f64 {
    (wind_direction - 180.0 - bearing).to_radians()
}

pub fn wind_factor(wind_speed: f64, alignment: f64, params: &CombustionParams) -> f64 {
    (params.wind_exponent * wind_speed * alignment.cos()).exp()
}

/// Geometry and factors of one (burning source, unburned target) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCoefficients {
    pub bearing: f64,
    pub distance: f64,
    pub slope_angle: f64,
    pub wind_factor: f64,
    pub slope_factor: f64,
    pub effective_rate: f64,
}

/// Effective spread rate from `source` into `target`.
///
/// Returns `None` when either cell has no attributes.
pub fn spread_between(
    source: &Cell,
    target: &Cell,
    params: &CombustionParams,
) -> Option<PairCoefficients> {
    let from = source.attributes?;
    let to = target.attributes?;

    let bearing = initial_bearing(source.coordinate, target.coordinate);
    let distance = haversine_distance(source.coordinate, target.coordinate);
    let theta = slope_angle(to.elevation - from.elevation, distance);
    let k_theta = slope_factor(theta, params);
    let k_phi = wind_factor(
        from.wind_speed,
        wind_alignment(from.wind_direction, bearing),
        params,
    );
    let k_s = target.coefficients.fuel_factor;

    let effective_rate =
        source.coefficients.base_rate * k_phi * k_theta * k_s * k_s * params.normalization;

    Some(PairCoefficients {
        bearing,
        distance,
        slope_angle: theta,
        wind_factor: k_phi,
        slope_factor: k_theta,
        effective_rate,
    })
}

/// Intensity a target gains in one tick from a source spreading at `rate`.
pub fn contribution(rate: f64, tick_minutes: f64, scale_m: f64) -> f64 {
    if scale_m <= 0.0 {
        return 0.0;
    }
    (rate * tick_minutes / scale_m).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::cell::{GeoCoordinate, GridPosition};
    use crate::provider::Surface;

    fn attrs() -> EnvironmentalAttributes {
        EnvironmentalAttributes {
            elevation: 100.0,
            fuel_load: 70.0,
            temperature: 30.0,
            humidity: 20.0,
            wind_direction: 270.0,
            wind_speed: 0.0,
            surface: Surface::Vegetation,
            observed_fire: false,
        }
    }

    fn cell_at(lat: f64, lon: f64, a: EnvironmentalAttributes) -> Cell {
        Cell::new(
            GridPosition::new(0, 0),
            GeoCoordinate::new(lat, lon),
            Some(a),
            &CombustionParams::default(),
        )
    }

    #[test]
    fn fuel_factor_floor_and_growth() {
        assert!((fuel_factor(0.0) - 0.027).abs() < 1e-12);
        assert!((fuel_factor(70.0) - 1.0).abs() < 1e-12);
        assert!(fuel_factor(90.0) > fuel_factor(10.0));
    }

    #[test]
    fn base_rate_matches_weather_formula() {
        let params = CombustionParams::default();
        // 0.03*30 + 0 + 0.01*80 - 0.3 = 1.4
        assert!((base_rate(&attrs(), &params) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn base_rate_never_negative() {
        let cold = EnvironmentalAttributes {
            temperature: -30.0,
            humidity: 100.0,
            ..attrs()
        };
        assert_eq!(base_rate(&cold, &CombustionParams::default()), 0.0);
    }

    #[test]
    fn zero_distance_gives_zero_slope() {
        assert_eq!(slope_angle(50.0, 0.0), 0.0);
        assert_eq!(slope_angle(50.0, f64::NAN), 0.0);
        assert!(slope_angle(10.0, 10.0) > 0.78 && slope_angle(10.0, 10.0) < 0.79);
    }

    #[test]
    fn uphill_accelerates_and_downhill_slows() {
        let params = CombustionParams::default();
        assert!(slope_factor(slope_angle(10.0, 30.0), &params) > 1.0);
        assert!(slope_factor(slope_angle(-10.0, 30.0), &params) < 1.0);
        assert_eq!(slope_factor(0.0, &params), 1.0);
    }

    #[test]
    fn wind_amplifies_downwind_and_suppresses_upwind() {
        let params = CombustionParams::default();
        // Wind from the west (270) pushes fire east (bearing 90).
        let downwind = wind_factor(5.0, wind_alignment(270.0, 90.0), &params);
        let upwind = wind_factor(5.0, wind_alignment(270.0, 270.0), &params);
        let crosswind = wind_factor(5.0, wind_alignment(270.0, 0.0), &params);
        assert!(downwind > 1.0);
        assert!(upwind < 1.0);
        assert!((crosswind - 1.0).abs() < 1e-9);
        assert!((downwind * upwind - 1.0).abs() < 1e-9);
    }

    #[test]
    fn calm_air_has_unit_wind_factor() {
        let params = CombustionParams::default();
        assert_eq!(wind_factor(0.0, 1.234, &params), 1.0);
    }

    #[test]
    fn spread_rate_combines_factors() {
        let params = CombustionParams::default();
        let source = cell_at(44.0, 5.0, attrs());
        let target = cell_at(44.0, 5.0004, attrs());
        let pair = spread_between(&source, &target, &params).unwrap();
        assert!((pair.bearing - 90.0).abs() < 0.01);
        assert!(pair.distance > 30.0 && pair.distance < 35.0);
        assert_eq!(pair.slope_factor, 1.0);
        assert_eq!(pair.wind_factor, 1.0);
        assert!((pair.effective_rate - 1.4 * 0.13).abs() < 1e-12);
    }

    #[test]
    fn target_fuel_governs_rate() {
        let params = CombustionParams::default();
        let source = cell_at(44.0, 5.0, attrs());
        let sparse = cell_at(44.0, 5.0004, EnvironmentalAttributes { fuel_load: 10.0, ..attrs() });
        let dense = cell_at(44.0, 4.9996, EnvironmentalAttributes { fuel_load: 90.0, ..attrs() });
        let r_sparse = spread_between(&source, &sparse, &params).unwrap().effective_rate;
        let r_dense = spread_between(&source, &dense, &params).unwrap().effective_rate;
        assert!(r_dense > r_sparse * 100.0);
    }

    #[test]
    fn missing_attributes_yield_no_pair() {
        let params = CombustionParams::default();
        let source = cell_at(44.0, 5.0, attrs());
        let gap = Cell::new(GridPosition::new(0, 1), GeoCoordinate::new(44.0, 5.0004), None, &params);
        assert!(spread_between(&source, &gap, &params).is_none());
    }

    #[test]
    fn contribution_scales_with_rate_and_step() {
        assert!((contribution(0.5, 1.5, 30.0) - 0.025).abs() < 1e-12);
        assert_eq!(contribution(0.5, 1.5, 0.0), 0.0);
        assert_eq!(contribution(-1.0, 1.5, 30.0), 0.0);
    }

    #[test]
    fn tick_minutes_follow_scale() {
        let params = CombustionParams::default();
        assert!((params.tick_minutes(30.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn default_params_are_valid() {
        assert!(CombustionParams::default().validate().is_ok());
    }

    #[test]
    fn negative_decay_and_zero_time_step_rejected() {
        let params = CombustionParams {
            decay_rate: -0.5,
            precision: 0.0,
            max_spread_rate: -1.0,
            ..CombustionParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.contains("decay_rate"));
        assert!(err.contains("precision"));
        assert!(err.contains("max_spread_rate"));
        assert_eq!(err.lines().count(), 3);
    }

    #[test]
    fn non_finite_exponent_rejected() {
        let params = CombustionParams {
            wind_exponent: f64::NAN,
            ..CombustionParams::default()
        };
        assert!(params.validate().unwrap_err().contains("wind_exponent"));
    }
}
