//! Geographic coordinates and great-circle helpers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SentinelError};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub lng: f64,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.lat, self.lng)
    }
}

impl Coordinate {
    /// Create a coordinate without validation
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate, rejecting non-finite or out-of-range values
    pub fn checked(lat: f64, lng: f64) -> Result<Self> {
        let coordinate = Self::new(lat, lng);
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(SentinelError::InvalidCoordinate { lat, lng })
        }
    }

    /// Finite and within the latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to another coordinate in kilometers
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(self, other)
    }

    /// Initial bearing towards another coordinate (0-360, 0 = North)
    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        initial_bearing(self, other)
    }

    /// Project this coordinate along a bearing for a distance in kilometers.
    ///
    /// Uses the spherical destination-point formula, so the haversine
    /// distance between `self` and the result equals `distance_km`.
    pub fn project(&self, bearing_deg: f64, distance_km: f64) -> Coordinate {
        let lat1 = self.lat.to_radians();
        let lng1 = self.lng.to_radians();
        let bearing = bearing_deg.to_radians();
        let angular = distance_km / EARTH_RADIUS_KM;

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lng2 = lng1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Normalize longitude to -180..180
        let lng2 = (lng2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

        Coordinate::new(lat2.to_degrees(), lng2)
    }
}

/// Haversine distance between two coordinates in kilometers
pub fn haversine_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlat = (to.lat - from.lat).to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial great-circle bearing in degrees (0-360, 0 = North)
pub fn initial_bearing(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Travel time in whole minutes, rounded up
pub fn eta_minutes(distance_km: f64, speed_kmh: f64) -> u32 {
    if distance_km <= 0.0 || speed_kmh <= 0.0 {
        return 0;
    }
    (distance_km / speed_kmh * 60.0).ceil() as u32
}

/// 8-point compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompassDirection {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl CompassDirection {
    const ALL: [CompassDirection; 8] = [
        CompassDirection::North,
        CompassDirection::Northeast,
        CompassDirection::East,
        CompassDirection::Southeast,
        CompassDirection::South,
        CompassDirection::Southwest,
        CompassDirection::West,
        CompassDirection::Northwest,
    ];

    /// Bucket a bearing into 45° sectors centered on the compass points
    pub fn from_bearing(bearing: f64) -> Self {
        let normalized = bearing.rem_euclid(360.0);
        let index = (normalized / 45.0).round() as usize % 8;
        Self::ALL[index]
    }

    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            CompassDirection::North => "North",
            CompassDirection::Northeast => "Northeast",
            CompassDirection::East => "East",
            CompassDirection::Southeast => "Southeast",
            CompassDirection::South => "South",
            CompassDirection::Southwest => "Southwest",
            CompassDirection::West => "West",
            CompassDirection::Northwest => "Northwest",
        }
    }
}

impl fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANGALORE: Coordinate = Coordinate::new(12.9716, 77.5946);

    #[test]
    fn test_distance_calculation() {
        let sf = Coordinate::new(37.7749, -122.4194);
        let la = Coordinate::new(34.0522, -118.2437);

        // Approximately 559 km
        assert!((sf.distance_km(&la) - 559.0).abs() < 10.0);
    }

    #[test]
    fn test_distance_symmetric_and_zero() {
        let points = [
            BANGALORE,
            Coordinate::new(13.0, 77.6),
            Coordinate::new(-33.8688, 151.2093),
            Coordinate::new(64.1466, -21.9426),
        ];

        for a in &points {
            assert_eq!(haversine_km(a, a), 0.0);
            for b in &points {
                assert_eq!(haversine_km(a, b), haversine_km(b, a));
            }
        }
    }

    #[test]
    fn test_bearing_cardinals() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((origin.bearing_to(&Coordinate::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((origin.bearing_to(&Coordinate::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((origin.bearing_to(&Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((origin.bearing_to(&Coordinate::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_compass_buckets() {
        assert_eq!(CompassDirection::from_bearing(90.0), CompassDirection::East);
        assert_eq!(CompassDirection::from_bearing(0.0), CompassDirection::North);
        assert_eq!(CompassDirection::from_bearing(22.4), CompassDirection::North);
        assert_eq!(CompassDirection::from_bearing(22.5), CompassDirection::Northeast);
        // round(44 / 45) == 1
        assert_eq!(CompassDirection::from_bearing(44.0), CompassDirection::Northeast);
        assert_eq!(CompassDirection::from_bearing(350.0), CompassDirection::North);
        assert_eq!(CompassDirection::from_bearing(-90.0), CompassDirection::West);
        assert_eq!(CompassDirection::from_bearing(225.0).to_string(), "Southwest");
    }

    #[test]
    fn test_project_roundtrip_distance() {
        for bearing in [0.0, 45.0, 133.0, 270.0, 359.0] {
            let target = BANGALORE.project(bearing, 3.5);
            assert!((BANGALORE.distance_km(&target) - 3.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_eta_minutes_rounds_up() {
        assert_eq!(eta_minutes(10.0, 40.0), 15);
        assert_eq!(eta_minutes(10.1, 40.0), 16);
        assert_eq!(eta_minutes(0.0, 40.0), 0);
    }

    #[test]
    fn test_checked_rejects_invalid() {
        assert!(Coordinate::checked(91.0, 0.0).is_err());
        assert!(Coordinate::checked(f64::NAN, 0.0).is_err());
        assert!(Coordinate::checked(12.0, 77.0).is_ok());
    }
}
