//! Dispatch service
//!
//! The service owns the one [`DispatchSession`]; every mutation happens
//! inside [`DispatchService::run`]. Network calls run on spawned tasks that
//! report back on a completion channel tagged with the session id, and
//! timers report through the [`TickScheduler`]. Anything that arrives for a
//! session (or phase) that has moved on is discarded.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use sentinel_core::config::{DispatchConfig, SentinelConfig};
use sentinel_core::surface::{facility_marker, ROUTE_TO_FACILITY, ROUTE_TO_USER, USER_MARKER, VEHICLE_MARKER};
use sentinel_core::{
    AlertDispatcher, Coordinate, FacilityDiscovery, FacilityList, GeolocationProvider, MapSurface,
    MarkerKind, PhoneNumber, PhoneStore, RoutePolyline, RoutingClient, SentinelError,
};

use crate::enrichment::{enrich_and_rank, EnrichmentParams};
use crate::error::{DispatchError, Result};
use crate::event::{DispatchEvent, DispatchStats};
use crate::movement::{self, Advance, LegKind, MovementParams};
use crate::origin::generate_dispatch_origin;
use crate::scheduler::{Tick, TickScheduler, TimerClass};
use crate::session::{DispatchSession, LegSummary, Legs, Mode, Phase, SessionId, SessionSnapshot};

/// External collaborators the lifecycle drives
#[derive(Clone)]
pub struct Collaborators {
    pub router: Arc<dyn RoutingClient>,
    pub discovery: Arc<dyn FacilityDiscovery>,
    pub alert: Arc<dyn AlertDispatcher>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub phones: Arc<dyn PhoneStore>,
    pub surface: Arc<dyn MapSurface>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Commands that can be sent to the dispatch service
pub enum DispatchCommand {
    /// Start (or return) the SOS session
    TriggerSos { response: Reply<SessionSnapshot> },
    /// Record the emergency contact
    CapturePhone {
        phone: String,
        response: Reply<SessionSnapshot>,
    },
    /// Pick civilian or ambulance
    ChooseMode {
        mode: Mode,
        response: Reply<SessionSnapshot>,
    },
    /// User says the alert message was sent
    ConfirmAlertSent { response: Reply<SessionSnapshot> },
    /// Discard the list and scan again
    Rescan { response: Reply<SessionSnapshot> },
    /// Route to a facility
    SelectFacility {
        facility_id: String,
        response: Reply<SessionSnapshot>,
    },
    /// Begin movement along the routes
    StartNavigation { response: Reply<SessionSnapshot> },
    /// Abort the session
    Cancel { response: Reply<()> },
    /// Close the session after arrival
    AcknowledgeArrival { response: Reply<()> },
    /// Current session, if any
    GetSession {
        response: oneshot::Sender<Option<SessionSnapshot>>,
    },
    /// Service statistics
    GetStats {
        response: oneshot::Sender<DispatchStats>,
    },
    /// Shutdown
    Shutdown,
}

/// Handle for interacting with the dispatch service
#[derive(Clone)]
pub struct DispatchHandle {
    command_tx: mpsc::Sender<DispatchCommand>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl DispatchHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DispatchCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| DispatchError::Channel("Failed to send dispatch command".into()))?;
        rx.await
            .map_err(|_| DispatchError::Channel("Dispatch service dropped the request".into()))
    }

    /// Trigger SOS; resolves once the user is located. Idempotent while a
    /// session is active or being located.
    pub async fn trigger_sos(&self) -> Result<SessionSnapshot> {
        self.request(|response| DispatchCommand::TriggerSos { response })
            .await?
    }

    /// Validate, store and persist the emergency contact
    pub async fn capture_phone(&self, phone: impl Into<String>) -> Result<SessionSnapshot> {
        let phone = phone.into();
        self.request(|response| DispatchCommand::CapturePhone { phone, response })
            .await?
    }

    pub async fn choose_mode(&self, mode: Mode) -> Result<SessionSnapshot> {
        self.request(|response| DispatchCommand::ChooseMode { mode, response })
            .await?
    }

    pub async fn confirm_alert_sent(&self) -> Result<SessionSnapshot> {
        self.request(|response| DispatchCommand::ConfirmAlertSent { response })
            .await?
    }

    pub async fn rescan(&self) -> Result<SessionSnapshot> {
        self.request(|response| DispatchCommand::Rescan { response })
            .await?
    }

    /// Start fetching routes to a facility from the current list
    pub async fn select_facility(&self, facility_id: impl Into<String>) -> Result<SessionSnapshot> {
        let facility_id = facility_id.into();
        self.request(|response| DispatchCommand::SelectFacility {
            facility_id,
            response,
        })
        .await?
    }

    pub async fn start_navigation(&self) -> Result<SessionSnapshot> {
        self.request(|response| DispatchCommand::StartNavigation { response })
            .await?
    }

    pub async fn cancel(&self) -> Result<()> {
        self.request(|response| DispatchCommand::Cancel { response })
            .await?
    }

    pub async fn acknowledge_arrival(&self) -> Result<()> {
        self.request(|response| DispatchCommand::AcknowledgeArrival { response })
            .await?
    }

    pub async fn session(&self) -> Result<Option<SessionSnapshot>> {
        self.request(|response| DispatchCommand::GetSession { response })
            .await
    }

    pub async fn stats(&self) -> Result<DispatchStats> {
        self.request(|response| DispatchCommand::GetStats { response })
            .await
    }

    /// Shutdown the dispatch service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(DispatchCommand::Shutdown)
            .await
            .map_err(|_| DispatchError::Channel("Failed to send shutdown command".into()))
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }
}

/// Results of spawned work
enum Completion {
    Located {
        session: SessionId,
        /// `None` when an idle session is being re-armed
        location: Option<(Coordinate, Option<String>)>,
        stored_phone: Option<PhoneNumber>,
    },
    Scanned {
        session: SessionId,
        facilities: FacilityList,
    },
    Routed {
        session: SessionId,
        facility_id: String,
        legs: Legs,
        fallbacks: u64,
    },
    Tracked {
        session: SessionId,
        fix: sentinel_core::Result<Coordinate>,
    },
}

/// SOS requests waiting for the location and contact lookup
struct PendingSos {
    session: SessionId,
    waiters: Vec<Reply<SessionSnapshot>>,
}

/// Owns the dispatch session and drives it
pub struct DispatchService {
    config: DispatchConfig,
    movement: MovementParams,
    enrichment: EnrichmentParams,
    radius_km: f64,
    max_results: usize,
    collaborators: Collaborators,
    session: Option<DispatchSession>,
    pending_sos: Option<PendingSos>,
    scheduler: TickScheduler,
    tick_rx: mpsc::Receiver<Tick>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    command_rx: mpsc::Receiver<DispatchCommand>,
    event_tx: broadcast::Sender<DispatchEvent>,
    stats: DispatchStats,
    rng: StdRng,
}

impl DispatchService {
    /// Create a new dispatch service
    pub fn new(
        config: &SentinelConfig,
        collaborators: Collaborators,
    ) -> (Self, DispatchHandle, broadcast::Receiver<DispatchEvent>) {
        let (event_tx, event_rx) = broadcast::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(256);
        let (completion_tx, completion_rx) = mpsc::channel(64);
        let (tick_tx, tick_rx) = mpsc::channel(64);

        let handle = DispatchHandle {
            command_tx,
            event_tx: event_tx.clone(),
        };

        let service = Self {
            config: config.dispatch.clone(),
            movement: MovementParams::from(&config.dispatch),
            enrichment: EnrichmentParams {
                limit: config.discovery.enrichment_limit,
                estimate_speed_kmh: config.discovery.estimate_speed_kmh,
            },
            radius_km: config.discovery.radius_km,
            max_results: config.discovery.max_results,
            collaborators,
            session: None,
            pending_sos: None,
            scheduler: TickScheduler::new(tick_tx),
            tick_rx,
            completion_tx,
            completion_rx,
            command_rx,
            event_tx,
            stats: DispatchStats::default(),
            rng: StdRng::from_entropy(),
        };

        (service, handle, event_rx)
    }

    /// Seed the dispatch-origin generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Starting dispatch service");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }

                Some(tick) = self.tick_rx.recv() => {
                    self.handle_tick(tick);
                }
            }
        }

        self.scheduler.cancel_all();
        let _ = self.event_tx.send(DispatchEvent::Stopped);
        info!("Dispatch service stopped");
    }

    /// Handle a command; returns false to stop the loop
    fn handle_command(&mut self, cmd: DispatchCommand) -> bool {
        match cmd {
            DispatchCommand::TriggerSos { response } => self.trigger_sos(response),
            DispatchCommand::CapturePhone { phone, response } => {
                let _ = response.send(self.capture_phone(&phone));
            }
            DispatchCommand::ChooseMode { mode, response } => {
                let _ = response.send(self.choose_mode(mode));
            }
            DispatchCommand::ConfirmAlertSent { response } => {
                let _ = response.send(self.confirm_alert_sent());
            }
            DispatchCommand::Rescan { response } => {
                let _ = response.send(self.rescan());
            }
            DispatchCommand::SelectFacility {
                facility_id,
                response,
            } => {
                let _ = response.send(self.select_facility(&facility_id));
            }
            DispatchCommand::StartNavigation { response } => {
                let _ = response.send(self.start_navigation());
            }
            DispatchCommand::Cancel { response } => {
                let _ = response.send(self.cancel());
            }
            DispatchCommand::AcknowledgeArrival { response } => {
                let _ = response.send(self.acknowledge_arrival());
            }
            DispatchCommand::GetSession { response } => {
                let _ = response.send(self.session.as_ref().map(DispatchSession::snapshot));
            }
            DispatchCommand::GetStats { response } => {
                let _ = response.send(self.stats.clone());
            }
            DispatchCommand::Shutdown => {
                info!("Dispatch service shutting down");
                return false;
            }
        }
        true
    }

    fn emit(&self, event: DispatchEvent) {
        let _ = self.event_tx.send(event);
    }

    fn session_ref(&self) -> Result<&DispatchSession> {
        self.session.as_ref().ok_or(DispatchError::NoActiveSession)
    }

    fn snapshot(&self) -> Result<SessionSnapshot> {
        self.session_ref().map(DispatchSession::snapshot)
    }

    /// Apply a session transition and publish the phase change
    fn transition<T>(
        &mut self,
        f: impl FnOnce(&mut DispatchSession) -> Result<T>,
    ) -> Result<T> {
        let session = self.session.as_mut().ok_or(DispatchError::NoActiveSession)?;
        let from = session.phase();
        let out = f(session)?;
        let (id, to) = (session.id(), session.phase());

        if from != to {
            info!("Session {}: {:?} -> {:?}", id, from, to);
            self.emit(DispatchEvent::PhaseChanged {
                session: id,
                from,
                to,
            });
        }
        Ok(out)
    }

    /// Session `id` exists and is in `phase`
    fn is_current(&self, id: SessionId, phase: Phase) -> bool {
        self.session
            .as_ref()
            .map(|s| s.id() == id && s.phase() == phase)
            .unwrap_or(false)
    }

    fn drop_stale(&mut self, what: &str, session: SessionId) {
        self.stats.stale_completions_dropped += 1;
        debug!("Discarding stale {} for session {}", what, session);
    }

    /// Tear down timers and map layers
    fn reset(&mut self) {
        self.scheduler.cancel_all();
        self.collaborators.surface.clear();
    }

    /// Start an SOS, or join the one being located
    fn trigger_sos(&mut self, response: Reply<SessionSnapshot>) {
        if let Some(pending) = self.pending_sos.as_mut() {
            debug!("SOS for session {} still locating", pending.session);
            pending.waiters.push(response);
            return;
        }
        if let Some(session) = &self.session {
            if session.is_active() {
                debug!("SOS already active for session {}", session.id());
                let _ = response.send(Ok(session.snapshot()));
                return;
            }
        }

        // An idle session (empty scan) is re-armed in place
        let (id, needs_location) = match &self.session {
            Some(session) => (session.id(), false),
            None => (SessionId::new(), true),
        };
        self.pending_sos = Some(PendingSos {
            session: id,
            waiters: vec![response],
        });
        self.spawn_locate(id, needs_location);
    }

    fn spawn_locate(&self, session: SessionId, needs_location: bool) {
        let geolocation = self.collaborators.geolocation.clone();
        let phones = self.collaborators.phones.clone();
        let timeout = self.config.geolocation_timeout;
        let fallback = self.config.default_location;
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let stored_phone = match phones.load_phone().await {
                Ok(phone) => phone,
                Err(e) => {
                    warn!("Could not load emergency contact: {}", e);
                    None
                }
            };
            let location = if needs_location {
                Some(locate(geolocation.as_ref(), timeout, fallback).await)
            } else {
                None
            };
            let _ = completion_tx
                .send(Completion::Located {
                    session,
                    location,
                    stored_phone,
                })
                .await;
        });
    }

    fn session_located(
        &mut self,
        id: SessionId,
        location: Option<(Coordinate, Option<String>)>,
        stored_phone: Option<PhoneNumber>,
    ) {
        let pending = match self.pending_sos.take() {
            Some(pending) if pending.session == id => pending,
            other => {
                self.pending_sos = other;
                self.drop_stale("location result", id);
                return;
            }
        };

        // A pending SOS with a location to resolve never has a session beside it
        let location = location.filter(|_| self.session.is_none());
        if let Some((location, fallback_reason)) = location {
            self.session = Some(DispatchSession::with_id(id, location));
            self.stats.sessions_started += 1;

            info!("SOS triggered, session {} at {}", id, location);
            self.emit(DispatchEvent::SessionStarted { session: id });
            if let Some(reason) = fallback_reason {
                self.stats.location_fallbacks += 1;
                self.emit(DispatchEvent::LocationFallback {
                    session: id,
                    location,
                    reason,
                });
            }
            self.collaborators
                .surface
                .upsert_marker(USER_MARKER, MarkerKind::User, location);
        }

        let stored_phone =
            stored_phone.or_else(|| self.session.as_ref().and_then(|s| s.phone().cloned()));
        let result = self
            .transition(|s| s.trigger_sos(stored_phone))
            .and_then(|_| self.snapshot());
        for waiter in pending.waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn capture_phone(&mut self, raw: &str) -> Result<SessionSnapshot> {
        self.session_ref()?;
        let phone = PhoneNumber::parse(raw)?;
        self.transition(|s| s.capture_phone(phone.clone()))?;

        let phones = self.collaborators.phones.clone();
        tokio::spawn(async move {
            if let Err(e) = phones.save_phone(&phone).await {
                warn!("Could not persist emergency contact: {}", e);
            }
        });
        self.snapshot()
    }

    fn choose_mode(&mut self, mode: Mode) -> Result<SessionSnapshot> {
        match mode {
            Mode::Civilian => {
                self.transition(DispatchSession::choose_civilian)?;
                self.spawn_scan()?;
            }
            Mode::Ambulance => {
                let session = self.session_ref()?;
                if session.phase() != Phase::ModeSelect {
                    return Err(DispatchError::InvalidTransition {
                        from: session.phase(),
                        action: "choose ambulance mode",
                    });
                }
                let phone = session.phone().cloned().ok_or_else(|| {
                    DispatchError::InvalidInput("ambulance mode needs an emergency contact".into())
                })?;
                let link = self
                    .collaborators
                    .alert
                    .emergency_link(&phone, session.user_location())?;
                let id = session.id();

                self.transition(DispatchSession::choose_ambulance)?;
                info!("Alert link ready for {}", link.recipient);
                self.emit(DispatchEvent::AlertOpened { session: id, link });
                self.transition(DispatchSession::alert_opened)?;
            }
            Mode::None => {
                return Err(DispatchError::InvalidInput(
                    "mode must be civilian or ambulance".into(),
                ));
            }
        }
        self.snapshot()
    }

    fn confirm_alert_sent(&mut self) -> Result<SessionSnapshot> {
        let user = self.session_ref()?.user_location();
        let origin = generate_dispatch_origin(
            &mut self.rng,
            user,
            self.config.dispatch_min_km,
            self.config.dispatch_max_km,
        );
        self.transition(|s| s.confirm_alert_sent(origin))?;

        info!(
            "Ambulance dispatched from {} ({:.1} km away)",
            origin,
            user.distance_km(&origin)
        );
        self.collaborators
            .surface
            .upsert_marker(VEHICLE_MARKER, MarkerKind::Ambulance, origin);
        self.spawn_scan()?;
        self.snapshot()
    }

    fn rescan(&mut self) -> Result<SessionSnapshot> {
        let previous: Vec<String> = self
            .session_ref()?
            .facilities()
            .iter()
            .map(|f| f.id.clone())
            .collect();
        self.transition(DispatchSession::rescan)?;

        for id in previous {
            self.collaborators.surface.remove(&facility_marker(&id));
        }
        self.spawn_scan()?;
        self.snapshot()
    }

    fn spawn_scan(&self) -> Result<()> {
        let session = self.session_ref()?;
        let (id, center) = (session.id(), session.user_location());
        let discovery = self.collaborators.discovery.clone();
        let router = self.collaborators.router.clone();
        let (radius_km, max_results, params) = (self.radius_km, self.max_results, self.enrichment);
        let completion_tx = self.completion_tx.clone();

        info!("Scanning for facilities within {} km of {}", radius_km, center);
        tokio::spawn(async move {
            let found = match discovery.discover(center, radius_km).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("Facility discovery via {} failed: {}", discovery.name(), e);
                    Vec::new()
                }
            };
            let found: Vec<_> = found.into_iter().take(max_results).collect();
            let facilities = enrich_and_rank(router.as_ref(), center, found, params).await;
            let _ = completion_tx
                .send(Completion::Scanned {
                    session: id,
                    facilities,
                })
                .await;
        });
        Ok(())
    }

    fn select_facility(&mut self, facility_id: &str) -> Result<SessionSnapshot> {
        let facility = self.transition(|s| s.begin_route(facility_id))?;

        let session = self.session_ref()?;
        let (id, mode, user, origin) = (
            session.id(),
            session.mode(),
            session.user_location(),
            session.dispatch_origin(),
        );
        let router = self.collaborators.router.clone();
        let speed = self.config.fallback_speed_kmh;
        let completion_tx = self.completion_tx.clone();

        info!("Routing session {} to {} ({})", id, facility.name, facility.id);
        tokio::spawn(async move {
            let to_facility = route_or_fallback(router.as_ref(), user, facility.coordinate, speed);
            let legs = match (mode, origin) {
                (Mode::Ambulance, Some(origin)) => {
                    let to_user = route_or_fallback(router.as_ref(), origin, user, speed);
                    let (to_user, to_facility) = tokio::join!(to_user, to_facility);
                    Legs {
                        to_user: Some(to_user),
                        to_facility: Some(to_facility),
                    }
                }
                _ => Legs {
                    to_user: None,
                    to_facility: Some(to_facility.await),
                },
            };
            let fallbacks = [&legs.to_user, &legs.to_facility]
                .into_iter()
                .flatten()
                .filter(|leg| leg.is_fallback())
                .count() as u64;
            let _ = completion_tx
                .send(Completion::Routed {
                    session: id,
                    facility_id: facility.id,
                    legs,
                    fallbacks,
                })
                .await;
        });

        self.snapshot()
    }

    fn start_navigation(&mut self) -> Result<SessionSnapshot> {
        let leg = self.transition(DispatchSession::start_navigation)?;

        let session = self.session_ref()?;
        let (id, mode) = (session.id(), session.mode());
        let route = session
            .active_route()
            .ok_or_else(|| DispatchError::InvalidInput(format!("no {leg:?} leg")))?;
        let instruction = movement::start_instruction(route, self.movement.lookahead);
        let start = route.origin();

        let (class, period) = match mode {
            Mode::Ambulance => {
                self.collaborators
                    .surface
                    .upsert_marker(VEHICLE_MARKER, MarkerKind::Ambulance, start);
                (TimerClass::MovementSimulation, self.config.ambulance_tick)
            }
            _ => (TimerClass::PositionTracking, self.config.tracking_tick),
        };
        self.scheduler.start(id, class, period, Duration::ZERO);

        info!("Navigation started for session {}: {}", id, instruction);
        self.emit(DispatchEvent::NavigationStarted {
            session: id,
            leg,
            instruction,
        });
        self.snapshot()
    }

    fn cancel(&mut self) -> Result<()> {
        if let Some(pending) = self.pending_sos.take() {
            info!("SOS for session {} cancelled while locating", pending.session);
            for waiter in pending.waiters {
                let _ = waiter.send(Err(DispatchError::SosCancelled));
            }
            if self.session.is_none() {
                self.stats.sessions_cancelled += 1;
                self.emit(DispatchEvent::Cancelled {
                    session: pending.session,
                });
                return Ok(());
            }
        }

        let session = self.session.take().ok_or(DispatchError::NoActiveSession)?;
        self.reset();
        self.stats.sessions_cancelled += 1;

        info!("Session {} cancelled while {:?}", session.id(), session.phase());
        self.emit(DispatchEvent::Cancelled {
            session: session.id(),
        });
        Ok(())
    }

    fn acknowledge_arrival(&mut self) -> Result<()> {
        let session = self.session_ref()?;
        if session.phase() != Phase::Arrived {
            return Err(DispatchError::InvalidTransition {
                from: session.phase(),
                action: "acknowledge arrival",
            });
        }
        let id = session.id();
        self.session = None;
        self.reset();

        info!("Session {} closed", id);
        self.emit(DispatchEvent::Closed { session: id });
        Ok(())
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Located {
                session,
                location,
                stored_phone,
            } => self.session_located(session, location, stored_phone),

            Completion::Scanned {
                session,
                facilities,
            } => {
                if !self.is_current(session, Phase::Scanning) {
                    self.drop_stale("scan result", session);
                    return;
                }
                match self.transition(|s| s.facilities_found(facilities)) {
                    Ok(Phase::Idle) => {
                        info!("No facilities found for session {}", session);
                        // The dispatched vehicle has nowhere to go
                        self.collaborators.surface.remove(VEHICLE_MARKER);
                        self.emit(DispatchEvent::NoFacilities { session });
                    }
                    Ok(_) => self.show_facilities(),
                    Err(e) => warn!("Scan result rejected: {}", e),
                }
            }

            Completion::Routed {
                session,
                facility_id,
                legs,
                fallbacks,
            } => {
                self.stats.routing_fallbacks += fallbacks;
                let pending = self
                    .session
                    .as_ref()
                    .and_then(|s| s.pending_facility())
                    == Some(facility_id.as_str());
                if !self.is_current(session, Phase::FacilitySelectionPending) || !pending {
                    self.drop_stale("route result", session);
                    return;
                }
                match self.transition(|s| s.routes_ready(&facility_id, legs)) {
                    Ok(()) => self.show_routes(),
                    Err(e) => warn!("Route result rejected: {}", e),
                }
            }

            Completion::Tracked { session, fix } => {
                if !self.is_current(session, Phase::Navigating) {
                    self.drop_stale("position fix", session);
                    return;
                }
                let live = match fix {
                    Ok(fix) if fix.is_valid() => fix,
                    Ok(_) | Err(_) => {
                        debug!("No live fix, advancing on schedule");
                        match self.session_ref() {
                            Ok(s) => s.user_location(),
                            Err(_) => return,
                        }
                    }
                };
                let params = self.movement;
                match self.transition(|s| s.track_position(live, &params)) {
                    Ok(advance) => self.apply_advance(advance),
                    Err(e) => warn!("Position update rejected: {}", e),
                }
            }
        }
    }

    fn show_facilities(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let surface = &self.collaborators.surface;
        let mut view = vec![session.user_location()];

        for facility in session.facilities() {
            surface.upsert_marker(
                &facility_marker(&facility.id),
                MarkerKind::Hospital,
                facility.coordinate,
            );
            view.push(facility.coordinate);
        }
        surface.fit_view(&view);

        info!(
            "Found {} facilities for session {}",
            session.facilities().len(),
            session.id()
        );
        self.emit(DispatchEvent::FacilitiesFound {
            session: session.id(),
            facilities: session.facilities().as_slice().to_vec(),
        });
    }

    fn show_routes(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(selected) = session.selected_facility() else {
            return;
        };
        let surface = &self.collaborators.surface;

        for facility in session.facilities() {
            if facility.id != selected.id {
                surface.remove(&facility_marker(&facility.id));
            }
        }
        surface.upsert_marker(
            &facility_marker(&selected.id),
            MarkerKind::SelectedHospital,
            selected.coordinate,
        );

        let legs = session.legs();
        if let Some(route) = &legs.to_user {
            surface.draw_polyline(ROUTE_TO_USER, MarkerKind::RouteToUser, route.points());
        }
        if let Some(route) = &legs.to_facility {
            surface.draw_polyline(ROUTE_TO_FACILITY, MarkerKind::RouteToFacility, route.points());
        }
        surface.fit_view(&legs.all_points());

        self.emit(DispatchEvent::RouteReady {
            session: session.id(),
            facility: selected.clone(),
            to_user: legs.to_user.as_ref().map(LegSummary::from),
            to_facility: legs.to_facility.as_ref().map(LegSummary::from),
        });
    }

    fn handle_tick(&mut self, tick: Tick) {
        let live_session = self.session.as_ref().map(DispatchSession::id) == Some(tick.session);
        if !live_session || !self.scheduler.is_current(&tick) {
            self.stats.stale_ticks_dropped += 1;
            debug!("Ignoring stale {:?} tick (generation {})", tick.class, tick.generation);
            return;
        }
        self.stats.ticks_processed += 1;

        match tick.class {
            TimerClass::MovementSimulation => {
                let params = self.movement;
                match self.transition(|s| s.advance(&params)) {
                    Ok(advance) => self.apply_advance(advance),
                    Err(e) => {
                        warn!("Movement tick rejected: {}", e);
                        self.scheduler.cancel(tick.class);
                    }
                }
            }
            TimerClass::PositionTracking => self.spawn_position_poll(tick.session),
        }
    }

    fn spawn_position_poll(&self, session: SessionId) {
        let geolocation = self.collaborators.geolocation.clone();
        let timeout = self.config.geolocation_timeout.min(self.config.tracking_tick);
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let fix = match tokio::time::timeout(timeout, geolocation.current_position()).await {
                Ok(fix) => fix,
                Err(_) => Err(SentinelError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                }),
            };
            let _ = completion_tx.send(Completion::Tracked { session, fix }).await;
        });
    }

    fn apply_advance(&mut self, advance: Advance) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let id = session.id();
        let surface = &self.collaborators.surface;

        match advance {
            Advance::Moved(progress) => {
                match session.mode() {
                    Mode::Ambulance => surface.upsert_marker(
                        VEHICLE_MARKER,
                        MarkerKind::Ambulance,
                        progress.position,
                    ),
                    _ => surface.upsert_marker(USER_MARKER, MarkerKind::User, session.user_location()),
                }
                if let Some(route) = session.active_route() {
                    let remaining = movement::remaining_points(route, progress.cursor);
                    if remaining.len() > 1 {
                        let (layer, kind) = match progress.leg {
                            LegKind::ToUser => (ROUTE_TO_USER, MarkerKind::RouteToUser),
                            LegKind::ToFacility => (ROUTE_TO_FACILITY, MarkerKind::RouteToFacility),
                        };
                        surface.draw_polyline(layer, kind, remaining);
                    }
                }

                debug!(
                    "Session {} {:?} cursor {}/{}, {:.1} km, {} min",
                    id, progress.leg, progress.cursor, progress.total, progress.remaining_km, progress.eta_min
                );
                self.emit(DispatchEvent::Progress {
                    session: id,
                    progress,
                });
            }

            Advance::Handover => {
                let name = session
                    .selected_facility()
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| "facility".to_string());
                surface.remove(ROUTE_TO_USER);
                let instruction = movement::handover_instruction(&name);
                info!("Ambulance reached the user in session {}; {}", id, instruction);

                self.scheduler.start(
                    id,
                    TimerClass::MovementSimulation,
                    self.config.ambulance_tick,
                    self.config.handover_pause,
                );
                self.emit(DispatchEvent::LegHandover {
                    session: id,
                    instruction,
                });
            }

            Advance::Arrived => {
                let facility = session.selected_facility().cloned();
                self.scheduler.cancel_all();
                self.stats.arrivals += 1;

                info!(
                    "Session {} arrived at {}",
                    id,
                    facility.as_ref().map(|f| f.name.as_str()).unwrap_or("destination")
                );
                self.emit(DispatchEvent::Arrived {
                    session: id,
                    facility,
                });
            }
        }
    }
}

/// Position fix bounded by `timeout`, else `fallback` with the reason
async fn locate(
    geolocation: &dyn GeolocationProvider,
    timeout: Duration,
    fallback: Coordinate,
) -> (Coordinate, Option<String>) {
    let reason = match tokio::time::timeout(timeout, geolocation.current_position()).await {
        Ok(Ok(position)) if position.is_valid() => return (position, None),
        Ok(Ok(position)) => format!("invalid position {position}"),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };

    warn!("Geolocation unavailable ({}), using default location {}", reason, fallback);
    (fallback, Some(reason))
}

/// Road route, or the straight-line fallback when routing failed
async fn route_or_fallback(
    router: &dyn RoutingClient,
    from: Coordinate,
    to: Coordinate,
    fallback_speed_kmh: f64,
) -> RoutePolyline {
    match router.route(from, to).await {
        Ok(route) => route,
        Err(e) => {
            warn!(
                "Routing {} -> {} via {} failed, using straight line: {}",
                from,
                to,
                router.name(),
                e
            );
            RoutePolyline::straight_line(from, to, fallback_speed_kmh)
        }
    }
}
