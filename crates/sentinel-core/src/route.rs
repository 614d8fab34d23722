//! Route polylines

use serde::{Deserialize, Serialize};

use crate::geo::{eta_minutes, Coordinate};

/// Where a route's geometry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Road geometry from the routing service
    Road,
    /// Two-point fallback when routing is unavailable
    StraightLine,
}

/// An ordered, non-empty sequence of waypoints with totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePolyline {
    points: Vec<Coordinate>,
    /// Total length in kilometers
    pub distance_km: f64,
    /// Expected travel time in whole minutes
    pub duration_min: u32,
    /// Geometry origin
    pub source: RouteSource,
}

impl RoutePolyline {
    /// Build a polyline from routed geometry. Returns `None` if `points` is empty.
    pub fn new(
        points: Vec<Coordinate>,
        distance_km: f64,
        duration_min: u32,
        source: RouteSource,
    ) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self {
            points,
            distance_km,
            duration_min,
            source,
        })
    }

    /// Straight-line fallback `[origin, destination]` at the given speed
    pub fn straight_line(origin: Coordinate, destination: Coordinate, speed_kmh: f64) -> Self {
        let distance_km = origin.distance_km(&destination);
        Self {
            points: vec![origin, destination],
            distance_km,
            duration_min: eta_minutes(distance_km, speed_kmh),
            source: RouteSource::StraightLine,
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Waypoint at `index`, clamped to the last point
    pub fn point(&self, index: usize) -> Coordinate {
        let last = self.points.len() - 1;
        self.points[index.min(last)]
    }

    pub fn origin(&self) -> Coordinate {
        self.points[0]
    }

    pub fn destination(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }

    /// Index of the waypoint closest to `position` (first one wins on ties)
    pub fn closest_index(&self, position: &Coordinate) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, point) in self.points.iter().enumerate() {
            let d = point.distance_km(position);
            if d < best_distance {
                best = i;
                best_distance = d;
            }
        }
        best
    }

    pub fn is_fallback(&self) -> bool {
        self.source == RouteSource::StraightLine
    }
}
