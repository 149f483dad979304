//! Spherical geometry used to place isochronic display positions
//!
//! All functions take degrees and meters and treat the Earth as a sphere.

use serde::{Deserialize, Serialize};

/// A point on the sphere in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Initial great-circle bearing from `from` to `to`, in degrees clockwise
/// from north, in the range [-180, 180].
pub fn bearing(from: LatLon, to: LatLon) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lon - from.lon).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
    y.atan2(x).to_degrees()
}

/// Point reached by travelling `distance_m` from `origin` along the
/// great circle with initial `bearing_deg`.
pub fn destination(origin: LatLon, bearing_deg: f64, distance_m: f64, radius_m: f64) -> LatLon {
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lon.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = distance_m / radius_m;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    LatLon::new(phi2.to_degrees(), lambda2.to_degrees())
}

/// Great-circle distance between two points (haversine)
pub fn haversine_distance(a: LatLon, b: LatLon, radius_m: f64) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * radius_m * h.sqrt().min(1.0).asin()
}
