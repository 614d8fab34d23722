//! Dispatch session state machine
//!
//! A [`DispatchSession`] is the single aggregate the lifecycle mutates.
//! Every transition is a named method that checks the current phase and
//! either applies the change or returns [`DispatchError::InvalidTransition`].
//! Side effects (network calls, timers, map updates, events) belong to the
//! service; this module is pure.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use sentinel_core::{Coordinate, Facility, FacilityList, PhoneNumber, RoutePolyline, RouteSource};

use crate::error::{DispatchError, Result};
use crate::movement::{self, Advance, LegKind, MovementParams, Progress};

/// Unique identifier of one SOS session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the user travels to the facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    None,
    /// Private vehicle, user → facility
    Civilian,
    /// Dispatched ambulance, origin → user → facility
    Ambulance,
}

/// Lifecycle phase. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    PhoneCapture,
    ModeSelect,
    AlertPending,
    AwaitingUserConfirmation,
    Scanning,
    FacilitySelectionPending,
    RouteReady,
    Navigating,
    Arrived,
}

/// The two journey segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Legs {
    pub to_user: Option<RoutePolyline>,
    pub to_facility: Option<RoutePolyline>,
}

impl Legs {
    pub fn get(&self, kind: LegKind) -> Option<&RoutePolyline> {
        match kind {
            LegKind::ToUser => self.to_user.as_ref(),
            LegKind::ToFacility => self.to_facility.as_ref(),
        }
    }

    /// All waypoints of both legs, for fitting the map view
    pub fn all_points(&self) -> Vec<Coordinate> {
        self.to_user
            .iter()
            .chain(self.to_facility.iter())
            .flat_map(|leg| leg.points().iter().copied())
            .collect()
    }
}

/// Aggregate root of one SOS
#[derive(Debug, Clone)]
pub struct DispatchSession {
    id: SessionId,
    mode: Mode,
    phase: Phase,
    user_location: Coordinate,
    phone: Option<PhoneNumber>,
    facilities: FacilityList,
    selected_facility: Option<Facility>,
    pending_facility: Option<String>,
    dispatch_origin: Option<Coordinate>,
    legs: Legs,
    active_leg: Option<LegKind>,
    cursor: usize,
    position: Option<Coordinate>,
}

impl DispatchSession {
    /// New session in `Idle` at the user's location
    pub fn new(user_location: Coordinate) -> Self {
        Self::with_id(SessionId::new(), user_location)
    }

    /// New session with an id reserved before the location was known
    pub fn with_id(id: SessionId, user_location: Coordinate) -> Self {
        Self {
            id,
            mode: Mode::None,
            phase: Phase::Idle,
            user_location,
            phone: None,
            facilities: FacilityList::empty(),
            selected_facility: None,
            pending_facility: None,
            dispatch_origin: None,
            legs: Legs::default(),
            active_leg: None,
            cursor: 0,
            position: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user_location(&self) -> Coordinate {
        self.user_location
    }

    pub fn phone(&self) -> Option<&PhoneNumber> {
        self.phone.as_ref()
    }

    pub fn facilities(&self) -> &FacilityList {
        &self.facilities
    }

    pub fn selected_facility(&self) -> Option<&Facility> {
        self.selected_facility.as_ref()
    }

    pub fn pending_facility(&self) -> Option<&str> {
        self.pending_facility.as_deref()
    }

    pub fn dispatch_origin(&self) -> Option<Coordinate> {
        self.dispatch_origin
    }

    pub fn legs(&self) -> &Legs {
        &self.legs
    }

    pub fn active_leg(&self) -> Option<LegKind> {
        self.active_leg
    }

    pub fn active_route(&self) -> Option<&RoutePolyline> {
        self.active_leg.and_then(|kind| self.legs.get(kind))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    /// True while a session exists beyond the initial idle state
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    fn require(&self, allowed: &[Phase], action: &'static str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(DispatchError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }

    /// `Idle → PhoneCapture`, or straight to `ModeSelect` with a stored phone
    pub fn trigger_sos(&mut self, stored_phone: Option<PhoneNumber>) -> Result<Phase> {
        self.require(&[Phase::Idle], "trigger SOS")?;
        self.phase = match stored_phone {
            Some(phone) => {
                self.phone = Some(phone);
                Phase::ModeSelect
            }
            None => Phase::PhoneCapture,
        };
        Ok(self.phase)
    }

    /// `PhoneCapture → ModeSelect`
    pub fn capture_phone(&mut self, phone: PhoneNumber) -> Result<()> {
        self.require(&[Phase::PhoneCapture], "capture phone")?;
        self.phone = Some(phone);
        self.phase = Phase::ModeSelect;
        Ok(())
    }

    /// `ModeSelect → Scanning` in civilian mode
    pub fn choose_civilian(&mut self) -> Result<()> {
        self.require(&[Phase::ModeSelect], "choose civilian mode")?;
        self.mode = Mode::Civilian;
        self.phase = Phase::Scanning;
        Ok(())
    }

    /// `ModeSelect → AlertPending` in ambulance mode
    pub fn choose_ambulance(&mut self) -> Result<()> {
        self.require(&[Phase::ModeSelect], "choose ambulance mode")?;
        if self.phone.is_none() {
            return Err(DispatchError::InvalidInput(
                "ambulance mode needs an emergency contact".into(),
            ));
        }
        self.mode = Mode::Ambulance;
        self.phase = Phase::AlertPending;
        Ok(())
    }

    /// `AlertPending → AwaitingUserConfirmation` once the link is published
    pub fn alert_opened(&mut self) -> Result<()> {
        self.require(&[Phase::AlertPending], "open alert")?;
        self.phase = Phase::AwaitingUserConfirmation;
        Ok(())
    }

    /// `AwaitingUserConfirmation → Scanning`, placing the simulated ambulance
    pub fn confirm_alert_sent(&mut self, dispatch_origin: Coordinate) -> Result<()> {
        self.require(&[Phase::AwaitingUserConfirmation], "confirm alert")?;
        self.dispatch_origin = Some(dispatch_origin);
        self.position = Some(dispatch_origin);
        self.phase = Phase::Scanning;
        Ok(())
    }

    /// `Scanning → FacilitySelectionPending`, or back to `Idle` when empty.
    ///
    /// The mode is retained on the empty path so a rescan can resume.
    pub fn facilities_found(&mut self, facilities: FacilityList) -> Result<Phase> {
        self.require(&[Phase::Scanning], "record facilities")?;
        if facilities.is_empty() {
            self.facilities = FacilityList::empty();
            self.phase = Phase::Idle;
        } else {
            self.facilities = facilities;
            self.phase = Phase::FacilitySelectionPending;
        }
        Ok(self.phase)
    }

    /// `FacilitySelectionPending | Idle → Scanning`, discarding the list
    pub fn rescan(&mut self) -> Result<()> {
        self.require(&[Phase::FacilitySelectionPending, Phase::Idle], "rescan")?;
        if self.mode == Mode::None {
            return Err(DispatchError::InvalidTransition {
                from: self.phase,
                action: "rescan",
            });
        }
        if self.pending_facility.is_some() {
            return Err(DispatchError::TransitionInFlight);
        }
        self.facilities = FacilityList::empty();
        self.phase = Phase::Scanning;
        Ok(())
    }

    /// Mark a facility as being routed to. Only one route fetch at a time.
    pub fn begin_route(&mut self, facility_id: &str) -> Result<Facility> {
        self.require(&[Phase::FacilitySelectionPending], "select facility")?;
        if self.pending_facility.is_some() {
            return Err(DispatchError::TransitionInFlight);
        }
        let facility = self
            .facilities
            .get(facility_id)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownFacility(facility_id.to_string()))?;
        self.pending_facility = Some(facility.id.clone());
        Ok(facility)
    }

    /// `FacilitySelectionPending → RouteReady` with the fetched legs
    pub fn routes_ready(&mut self, facility_id: &str, legs: Legs) -> Result<()> {
        self.require(&[Phase::FacilitySelectionPending], "accept routes")?;
        if self.pending_facility.as_deref() != Some(facility_id) {
            return Err(DispatchError::UnknownFacility(facility_id.to_string()));
        }
        if legs.to_facility.is_none() || (self.mode == Mode::Ambulance && legs.to_user.is_none()) {
            return Err(DispatchError::InvalidInput(format!(
                "missing route leg for {:?} mode",
                self.mode
            )));
        }
        let facility = self
            .facilities
            .get(facility_id)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownFacility(facility_id.to_string()))?;

        self.pending_facility = None;
        self.selected_facility = Some(facility);
        self.legs = legs;
        self.phase = Phase::RouteReady;
        Ok(())
    }

    /// Leg the journey starts on
    pub fn first_leg(&self) -> LegKind {
        match self.mode {
            Mode::Ambulance => LegKind::ToUser,
            _ => LegKind::ToFacility,
        }
    }

    /// `RouteReady → Navigating`, cursor 0 on the first leg
    pub fn start_navigation(&mut self) -> Result<LegKind> {
        self.require(&[Phase::RouteReady], "start navigation")?;
        let leg = self.first_leg();
        let origin = self
            .legs
            .get(leg)
            .map(RoutePolyline::origin)
            .ok_or_else(|| DispatchError::InvalidInput(format!("no {leg:?} leg")))?;

        self.active_leg = Some(leg);
        self.cursor = 0;
        self.position = Some(origin);
        self.phase = Phase::Navigating;
        Ok(leg)
    }

    /// Move the cursor by `params.step` waypoints
    pub fn advance(&mut self, params: &MovementParams) -> Result<Advance> {
        self.require(&[Phase::Navigating], "advance")?;
        let target = self.cursor + params.step;
        self.advance_to(target, params)
    }

    /// Civilian tracking: record the live fix and advance to
    /// `max(cursor + step, closest waypoint)`
    pub fn track_position(&mut self, live: Coordinate, params: &MovementParams) -> Result<Advance> {
        self.require(&[Phase::Navigating], "track position")?;
        if self.mode != Mode::Civilian {
            return Err(DispatchError::InvalidTransition {
                from: self.phase,
                action: "track position",
            });
        }
        self.user_location = live;
        let closest = self
            .active_route()
            .map(|route| route.closest_index(&live))
            .unwrap_or(0);
        let target = (self.cursor + params.step).max(closest);
        self.advance_to(target, params)
    }

    fn advance_to(&mut self, target: usize, params: &MovementParams) -> Result<Advance> {
        let leg = self.active_leg.ok_or(DispatchError::InvalidTransition {
            from: self.phase,
            action: "advance",
        })?;
        let len = self
            .legs
            .get(leg)
            .map(RoutePolyline::len)
            .ok_or_else(|| DispatchError::InvalidInput(format!("no {leg:?} leg")))?;

        if movement::completes_leg(target, len) {
            if leg == LegKind::ToUser && self.legs.to_facility.is_some() {
                self.active_leg = Some(LegKind::ToFacility);
                self.cursor = 0;
                return Ok(Advance::Handover);
            }
            self.cursor = len;
            self.phase = Phase::Arrived;
            return Ok(Advance::Arrived);
        }

        self.cursor = target;
        let route = self
            .legs
            .get(leg)
            .ok_or_else(|| DispatchError::InvalidInput(format!("no {leg:?} leg")))?;
        let position = route.point(target);
        self.position = Some(position);
        Ok(Advance::Moved(movement::progress_at(
            leg, route, target, position, params,
        )))
    }

    /// Current progress, `None` unless navigating
    pub fn progress(&self, params: &MovementParams) -> Option<Progress> {
        if self.phase != Phase::Navigating {
            return None;
        }
        let leg = self.active_leg?;
        let route = self.legs.get(leg)?;
        let position = self.position.unwrap_or_else(|| route.origin());
        Some(movement::progress_at(leg, route, self.cursor, position, params))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            mode: self.mode,
            phase: self.phase,
            user_location: self.user_location,
            phone: self.phone.as_ref().map(|p| p.to_string()),
            facilities: self.facilities.as_slice().to_vec(),
            selected_facility: self.selected_facility.clone(),
            pending_facility: self.pending_facility.clone(),
            dispatch_origin: self.dispatch_origin,
            active_leg: self.active_leg,
            cursor: self.cursor,
            position: self.position,
            to_user: self.legs.to_user.as_ref().map(LegSummary::from),
            to_facility: self.legs.to_facility.as_ref().map(LegSummary::from),
        }
    }
}

/// Totals of one leg without its geometry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegSummary {
    pub distance_km: f64,
    pub duration_min: u32,
    pub points: usize,
    pub source: RouteSource,
}

impl From<&RoutePolyline> for LegSummary {
    fn from(route: &RoutePolyline) -> Self {
        Self {
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            points: route.len(),
            source: route.source,
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub mode: Mode,
    pub phase: Phase,
    pub user_location: Coordinate,
    pub phone: Option<String>,
    pub facilities: Vec<Facility>,
    pub selected_facility: Option<Facility>,
    pub pending_facility: Option<String>,
    pub dispatch_origin: Option<Coordinate>,
    pub active_leg: Option<LegKind>,
    pub cursor: usize,
    pub position: Option<Coordinate>,
    pub to_user: Option<LegSummary>,
    pub to_facility: Option<LegSummary>,
}
