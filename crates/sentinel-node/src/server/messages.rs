//! API message types

use serde::{Deserialize, Serialize};

use sentinel_dispatch::{MapSnapshot, Mode, SessionSnapshot};

/// `POST /api/phone`
#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

/// `POST /api/mode`
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

/// `POST /api/facilities/select`
#[derive(Debug, Deserialize)]
pub struct SelectFacilityRequest {
    pub facility_id: String,
}

/// `POST /api/location`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Messages sent from server to client besides raw lifecycle events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Full state, sent on connect and on request
    Snapshot {
        session: Option<SessionSnapshot>,
        map: MapSnapshot,
    },

    /// Error message
    Error { code: &'static str, message: String },
}

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Browser geolocation fix
    Location { lat: f64, lng: f64 },

    /// Request a fresh snapshot
    GetSnapshot,
}
