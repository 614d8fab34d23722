//! Map rendering surface
//!
//! The lifecycle drives the map purely through keyed commands; it never
//! reads anything back. Keys are stable strings so a second upsert with the
//! same id replaces the first.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Marker id for the user position
pub const USER_MARKER: &str = "user";
/// Marker id for the simulated vehicle
pub const VEHICLE_MARKER: &str = "ambulance";
/// Layer id of the dispatch → user polyline
pub const ROUTE_TO_USER: &str = "route:to_user";
/// Layer id of the user → facility polyline
pub const ROUTE_TO_FACILITY: &str = "route:to_facility";

/// Marker id for a facility
pub fn facility_marker(facility_id: &str) -> String {
    format!("facility:{facility_id}")
}

/// What a marker or polyline represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    User,
    Ambulance,
    Hospital,
    /// Facility picked for navigation
    SelectedHospital,
    RouteToUser,
    RouteToFacility,
}

/// Opaque map surface driven by keyed commands
pub trait MapSurface: Send + Sync {
    /// Place or move a marker
    fn upsert_marker(&self, id: &str, kind: MarkerKind, at: Coordinate);

    /// Draw or replace a polyline layer
    fn draw_polyline(&self, id: &str, kind: MarkerKind, points: &[Coordinate]);

    /// Remove a marker or polyline; unknown ids are ignored
    fn remove(&self, id: &str);

    /// Fit the viewport around the given points
    fn fit_view(&self, points: &[Coordinate]);

    /// Remove every layer
    fn clear(&self);
}
