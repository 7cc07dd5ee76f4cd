//! Geographic primitives: coordinates, great-circle distance and bearings.
//!
//! All distances are metres on a sphere of radius [`EARTH_RADIUS_M`]; all
//! angles exposed here are degrees.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance calculation in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default tolerance (degrees) for treating two coordinates as the same place.
pub const COORD_EPSILON_DEG: f64 = 1e-5;

/// A WGS-84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Great-circle distance between two points in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial compass bearing from `a` to `b`, normalized to `[0, 360)`.
///
/// Identical points have no defined bearing; `0.0` is returned.
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Wrap any angle into `[0, 360)`.
pub fn normalize_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `[-180, 180)`.
pub fn normalize_angle_delta(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

/// Component-wise comparison of two coordinates within `epsilon` degrees.
pub fn almost_equal(a: GeoPoint, b: GeoPoint, epsilon: f64) -> bool {
    (a.lat - b.lat).abs() <= epsilon && (a.lon - b.lon).abs() <= epsilon
}
