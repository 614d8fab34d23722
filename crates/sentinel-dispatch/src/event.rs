//! Lifecycle events
//!
//! Events emitted by the dispatch service for consumption by the API
//! layer and tests.

use serde::Serialize;

use sentinel_core::{AlertLink, Coordinate, Facility};

use crate::movement::{LegKind, Progress};
use crate::session::{LegSummary, Phase, SessionId};

/// Events emitted by the dispatch service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// A new SOS session was created
    SessionStarted { session: SessionId },

    /// Lifecycle phase changed
    PhaseChanged {
        session: SessionId,
        from: Phase,
        to: Phase,
    },

    /// Geolocation failed; the configured default is used instead
    LocationFallback {
        session: SessionId,
        location: Coordinate,
        reason: String,
    },

    /// Alert link ready for the user to open
    AlertOpened { session: SessionId, link: AlertLink },

    /// Ranked facilities for selection
    FacilitiesFound {
        session: SessionId,
        facilities: Vec<Facility>,
    },

    /// Scan found nothing; the session went back to idle
    NoFacilities { session: SessionId },

    /// Routes fetched for the selected facility
    RouteReady {
        session: SessionId,
        facility: Facility,
        to_user: Option<LegSummary>,
        to_facility: Option<LegSummary>,
    },

    /// Navigation started on `leg`
    NavigationStarted {
        session: SessionId,
        leg: LegKind,
        instruction: String,
    },

    /// Marker moved
    Progress {
        session: SessionId,
        progress: Progress,
    },

    /// Ambulance reached the user; the facility leg follows
    LegHandover {
        session: SessionId,
        instruction: String,
    },

    /// Journey complete
    Arrived {
        session: SessionId,
        facility: Option<Facility>,
    },

    /// Session cancelled by the user
    Cancelled { session: SessionId },

    /// Session closed after arrival was acknowledged
    Closed { session: SessionId },

    /// Dispatch service stopped
    Stopped,
}

impl DispatchEvent {
    /// Session the event belongs to
    pub fn session(&self) -> Option<SessionId> {
        match self {
            DispatchEvent::SessionStarted { session }
            | DispatchEvent::PhaseChanged { session, .. }
            | DispatchEvent::LocationFallback { session, .. }
            | DispatchEvent::AlertOpened { session, .. }
            | DispatchEvent::FacilitiesFound { session, .. }
            | DispatchEvent::NoFacilities { session }
            | DispatchEvent::RouteReady { session, .. }
            | DispatchEvent::NavigationStarted { session, .. }
            | DispatchEvent::Progress { session, .. }
            | DispatchEvent::LegHandover { session, .. }
            | DispatchEvent::Arrived { session, .. }
            | DispatchEvent::Cancelled { session }
            | DispatchEvent::Closed { session } => Some(*session),
            DispatchEvent::Stopped => None,
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, DispatchEvent::Progress { .. })
    }

    /// Session ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchEvent::Cancelled { .. } | DispatchEvent::Closed { .. } | DispatchEvent::Stopped
        )
    }
}

/// Dispatch service statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub sessions_started: u64,
    pub sessions_cancelled: u64,
    pub arrivals: u64,
    pub ticks_processed: u64,
    pub stale_ticks_dropped: u64,
    pub stale_completions_dropped: u64,
    pub routing_fallbacks: u64,
    pub location_fallbacks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let session = SessionId::new();
        let event = DispatchEvent::PhaseChanged {
            session,
            from: Phase::Scanning,
            to: Phase::FacilitySelectionPending,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["to"], "facility_selection_pending");
        assert_eq!(event.session(), Some(session));
        assert!(!event.is_terminal());

        assert!(DispatchEvent::Stopped.is_terminal());
        assert_eq!(DispatchEvent::Stopped.session(), None);
    }
}
