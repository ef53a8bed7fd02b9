//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Spherical geometry helpers and the service-territory envelope."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use dnm_common::{DistanceMetric, TerritoryConfig};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_008.8;
pub const METERS_PER_MILE: f64 = 1_609.344;
pub const FEET_PER_MILE: f64 = 5_280.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Linear interpolation in degree space; stays inside any box holding both ends.
    pub fn lerp(self, other: GeoPoint, fraction: f64) -> GeoPoint {
        GeoPoint::new(
            self.latitude + (other.latitude - self.latitude) * fraction,
            self.longitude + (other.longitude - self.longitude) * fraction,
        )
    }

    pub fn midpoint(self, other: GeoPoint) -> GeoPoint {
        self.lerp(other, 0.5)
    }

    /// Point reached by travelling `distance_m` along `bearing_rad` (clockwise from north).
    pub fn destination(self, bearing_rad: f64, distance_m: f64) -> GeoPoint {
        let delta = distance_m / EARTH_RADIUS_M;
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();
        let lat2 =
            (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing_rad.cos()).asin();
        let lon2 = lon1
            + (bearing_rad.sin() * delta.sin() * lat1.cos())
                .atan2(delta.cos() - lat1.sin() * lat2.sin());
        GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
    }

    /// Initial bearing towards `other`, radians clockwise from north in `[0, 2π)`.
    pub fn bearing_to(self, other: GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        y.atan2(x).rem_euclid(std::f64::consts::TAU)
    }
}

pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub fn equirectangular_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let mean_lat = ((a.latitude + b.latitude) / 2.0).to_radians();
    let x = (b.longitude - a.longitude).to_radians() * mean_lat.cos();
    let y = (b.latitude - a.latitude).to_radians();
    EARTH_RADIUS_M * x.hypot(y)
}

pub fn distance_m(metric: DistanceMetric, a: GeoPoint, b: GeoPoint) -> f64 {
    match metric {
        DistanceMetric::Haversine => haversine_m(a, b),
        DistanceMetric::Equirectangular => equirectangular_m(a, b),
    }
}

pub fn distance_miles(metric: DistanceMetric, a: GeoPoint, b: GeoPoint) -> f64 {
    distance_m(metric, a, b) / METERS_PER_MILE
}

/// Eight-point compass label for a bearing in radians.
pub fn compass_label(bearing_rad: f64) -> &'static str {
    const LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let sector = (bearing_rad.to_degrees().rem_euclid(360.0) / 45.0).round() as usize % 8;
    LABELS[sector]
}

/// Service-territory bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Territory {
    bounds: TerritoryConfig,
}

impl Territory {
    pub fn new(bounds: TerritoryConfig) -> Self {
        Self { bounds }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.bounds.lat_min..=self.bounds.lat_max).contains(&point.latitude)
            && (self.bounds.lon_min..=self.bounds.lon_max).contains(&point.longitude)
    }

    /// Per-axis clamp. With the parent inside the box each axis only moves
    /// towards the parent, so the offset to the parent never grows.
    pub fn clamp(&self, point: GeoPoint) -> GeoPoint {
        GeoPoint::new(
            point.latitude.clamp(self.bounds.lat_min, self.bounds.lat_max),
            point.longitude.clamp(self.bounds.lon_min, self.bounds.lon_max),
        )
    }

    /// The box shrunk symmetrically to `fraction` of its span on each axis.
    pub fn inner(&self, fraction: f64) -> TerritoryConfig {
        let lat_margin = (self.bounds.lat_max - self.bounds.lat_min) * (1.0 - fraction) / 2.0;
        let lon_margin = (self.bounds.lon_max - self.bounds.lon_min) * (1.0 - fraction) / 2.0;
        TerritoryConfig {
            lat_min: self.bounds.lat_min + lat_margin,
            lat_max: self.bounds.lat_max - lat_margin,
            lon_min: self.bounds.lon_min + lon_margin,
            lon_max: self.bounds.lon_max - lon_margin,
        }
    }

    pub fn bounds(&self) -> &TerritoryConfig {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOENIX: GeoPoint = GeoPoint::new(33.45, -112.07);

    #[test]
    fn destination_round_trips_distance() {
        let target = PHOENIX.destination(1.0, 5_000.0);
        let distance = haversine_m(PHOENIX, target);
        assert!((distance - 5_000.0).abs() < 0.01, "distance {distance}");
        assert!((PHOENIX.bearing_to(target) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn metrics_agree_at_feeder_scale() {
        let target = PHOENIX.destination(0.3, 8.0 * METERS_PER_MILE);
        let h = haversine_m(PHOENIX, target);
        let e = equirectangular_m(PHOENIX, target);
        assert!((h - e).abs() / h < 1e-3);
    }

    #[test]
    fn clamp_moves_towards_inside() {
        let territory = Territory::new(TerritoryConfig::default());
        let outside = GeoPoint::new(34.0, -111.0);
        let clamped = territory.clamp(outside);
        assert!(territory.contains(clamped));
        assert!(!territory.contains(outside));
        assert!(territory.contains(PHOENIX));
    }

    #[test]
    fn compass_labels_cover_quadrants() {
        assert_eq!(compass_label(0.0), "N");
        assert_eq!(compass_label(std::f64::consts::FRAC_PI_2), "E");
        assert_eq!(compass_label(std::f64::consts::PI), "S");
        assert_eq!(compass_label(-std::f64::consts::FRAC_PI_4), "NW");
    }
}
