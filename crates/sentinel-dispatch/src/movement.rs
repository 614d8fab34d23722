//! Movement along a precomputed polyline
//!
//! Progress is an index into the active leg. Each tick moves the cursor a
//! fixed number of waypoints; distance and ETA are recomputed from the
//! simulated position to the leg destination.

use serde::{Deserialize, Serialize};

use sentinel_core::config::DispatchConfig;
use sentinel_core::{eta_minutes, CompassDirection, Coordinate, RoutePolyline};

/// Which journey segment a polyline covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// Dispatch origin to the user
    ToUser,
    /// User to the selected facility
    ToFacility,
}

/// Tunables for cursor advancement and ETA
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementParams {
    pub step: usize,
    pub to_user_speed_kmh: f64,
    pub facility_speed_kmh: f64,
    pub lookahead: usize,
}

impl MovementParams {
    pub fn speed_for(&self, leg: LegKind) -> f64 {
        match leg {
            LegKind::ToUser => self.to_user_speed_kmh,
            LegKind::ToFacility => self.facility_speed_kmh,
        }
    }
}

impl Default for MovementParams {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for MovementParams {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            step: config.cursor_step,
            to_user_speed_kmh: config.ambulance_speed_kmh,
            facility_speed_kmh: config.facility_speed_kmh,
            lookahead: config.turn_lookahead,
        }
    }
}

/// Snapshot of progress along the active leg
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub leg: LegKind,
    pub cursor: usize,
    pub total: usize,
    pub position: Coordinate,
    pub remaining_km: f64,
    pub eta_min: u32,
    pub next_turn: String,
}

/// Outcome of one movement step
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Still on the same leg
    Moved(Progress),
    /// First leg done, the facility leg is now active with cursor 0
    Handover,
    /// Final leg done
    Arrived,
}

/// Whether moving to `target` finishes a leg of `len` waypoints
pub fn completes_leg(target: usize, len: usize) -> bool {
    target >= len.saturating_sub(1)
}

/// Compass direction from `from` towards the waypoint `lookahead` past `cursor`
pub fn next_turn(
    route: &RoutePolyline,
    from: Coordinate,
    cursor: usize,
    lookahead: usize,
) -> CompassDirection {
    let target = route.point(cursor.saturating_add(lookahead));
    CompassDirection::from_bearing(from.bearing_to(&target))
}

/// Progress at `cursor` with the marker at `position`
pub fn progress_at(
    leg: LegKind,
    route: &RoutePolyline,
    cursor: usize,
    position: Coordinate,
    params: &MovementParams,
) -> Progress {
    let remaining_km = position.distance_km(&route.destination());
    Progress {
        leg,
        cursor,
        total: route.len(),
        position,
        remaining_km,
        eta_min: eta_minutes(remaining_km, params.speed_for(leg)),
        next_turn: format!(
            "Continue {}",
            next_turn(route, position, cursor, params.lookahead)
        ),
    }
}

/// Waypoints still ahead of the cursor, including the current one
pub fn remaining_points(route: &RoutePolyline, cursor: usize) -> &[Coordinate] {
    let points = route.points();
    &points[cursor.min(points.len())..]
}

pub fn start_instruction(route: &RoutePolyline, lookahead: usize) -> String {
    format!(
        "Head {} on emergency corridor",
        next_turn(route, route.origin(), 0, lookahead)
    )
}

pub fn handover_instruction(facility_name: &str) -> String {
    format!("Proceeding to {facility_name}")
}
