//! Flat-earth geometry for terminal-area distances.
//!
//! Positions are longitude/latitude pairs. Within a TRACON (a couple of
//! hundred nautical miles across) an equirectangular projection scaled at
//! the mean latitude is accurate enough for separation and culling.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Nautical miles per degree of latitude.
pub const NM_PER_LATITUDE: f32 = 60.0;

/// A longitude/latitude position in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Point2LL {
    /// Longitude in degrees (east positive).
    pub lon: f32,
    /// Latitude in degrees (north positive).
    pub lat: f32,
}

impl Point2LL {
    /// Construct a point from longitude and latitude.
    pub const fn new(lon: f32, lat: f32) -> Self {
        Self { lon, lat }
    }

    /// Whether both coordinates are zero (the "unset" sentinel in config).
    pub const fn is_zero(self) -> bool {
        self.lon == 0.0 && self.lat == 0.0
    }

    /// Whether both coordinates are finite.
    pub const fn is_finite(self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

/// Nautical miles per degree of longitude at the given latitude.
pub fn nm_per_longitude(lat: f32) -> f32 {
    NM_PER_LATITUDE * lat.to_radians().cos()
}

/// Distance between two points in nautical miles.
pub fn nm_distance(a: Point2LL, b: Point2LL) -> f32 {
    let mean_lat = (a.lat + b.lat) * 0.5;
    let dx = (b.lon - a.lon) * nm_per_longitude(mean_lat);
    let dy = (b.lat - a.lat) * NM_PER_LATITUDE;
    dx.hypot(dy)
}

/// True heading from `from` to `to`, in `(0, 360]`.
pub fn heading_between(from: Point2LL, to: Point2LL) -> f32 {
    let mean_lat = (from.lat + to.lat) * 0.5;
    let dx = (to.lon - from.lon) * nm_per_longitude(mean_lat);
    let dy = (to.lat - from.lat) * NM_PER_LATITUDE;
    normalize_heading(dx.atan2(dy).to_degrees())
}

/// Move `from` by `nm` nautical miles along `heading`.
pub fn offset(from: Point2LL, heading: f32, nm: f32) -> Point2LL {
    let rad = heading.to_radians();
    let dy = nm * rad.cos();
    let dx = nm * rad.sin();
    let per_lon = nm_per_longitude(from.lat);
    let lon = if per_lon.abs() > f32::EPSILON {
        from.lon + dx / per_lon
    } else {
        from.lon
    };
    Point2LL::new(lon, from.lat + dy / NM_PER_LATITUDE)
}

/// Normalize a heading into `(0, 360]`, with north reported as 360.
pub fn normalize_heading(heading: f32) -> f32 {
    let h = heading.rem_euclid(360.0);
    if h == 0.0 { 360.0 } else { h }
}

/// Signed shortest turn from `from` to `to` in degrees; positive is right.
pub fn heading_signed_turn(from: f32, to: f32) -> f32 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_sixty_miles() {
        let a = Point2LL::new(-73.0, 40.0);
        let b = Point2LL::new(-73.0, 41.0);
        assert!((nm_distance(a, b) - 60.0).abs() < 0.01);
    }

    #[test]
    fn heading_due_east() {
        let a = Point2LL::new(-73.0, 40.0);
        let b = Point2LL::new(-72.0, 40.0);
        assert!((heading_between(a, b) - 90.0).abs() < 0.5);
    }

    #[test]
    fn offset_round_trips_distance() {
        let a = Point2LL::new(-73.0, 40.0);
        let b = offset(a, 45.0, 10.0);
        assert!((nm_distance(a, b) - 10.0).abs() < 0.05);
        assert!((heading_between(a, b) - 45.0).abs() < 0.5);
    }

    #[test]
    fn north_is_360() {
        assert!((normalize_heading(0.0) - 360.0).abs() < f32::EPSILON);
        assert!((normalize_heading(-90.0) - 270.0).abs() < f32::EPSILON);
        assert!((normalize_heading(370.0) - 10.0).abs() < 0.001);
    }

    #[test]
    fn signed_turn_takes_short_way() {
        assert!((heading_signed_turn(350.0, 10.0) - 20.0).abs() < 0.001);
        assert!((heading_signed_turn(10.0, 350.0) + 20.0).abs() < 0.001);
    }
}
