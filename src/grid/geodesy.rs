//! Geographic helpers for neighbour geometry.
//!
//! Distances are great-circle (haversine) on a spherical Earth; bearings are
//! initial great-circle bearings in degrees clockwise from north.

use crate::grid::cell::GeoCoordinate;

/// Earth radius used for distances, in metres.
pub const EARTH_RADIUS_M: f64 = 6_373_000.0;

/// Length of one degree of latitude, in metres.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance between two coordinates in metres (haversine formula).
pub fn haversine_distance(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let dlat = lat_b - lat_a;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `from` toward `to`, degrees in [0, 360) (0=N, 90=E, 180=S, 270=W).
/// Returns 0 for coincident points.
pub fn initial_bearing(from: GeoCoordinate, to: GeoCoordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    if x.abs() < 1e-15 && y.abs() < 1e-15 {
        return 0.0;
    }

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Degree increments (latitude, longitude) covering `scale_m` metres at `reference_latitude`.
pub fn degree_step(scale_m: f64, reference_latitude: f64) -> (f64, f64) {
    let lat_step = scale_m / METERS_PER_DEGREE;
    let cos_lat = reference_latitude.to_radians().cos().max(1e-6);
    let lon_step = scale_m / (METERS_PER_DEGREE * cos_lat);
    (lat_step, lon_step)
}

/// Round to 6 decimal places (about 0.1 m), the precision coordinates are keyed at.
pub fn round_micro(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
