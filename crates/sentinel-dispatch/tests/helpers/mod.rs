//! Shared setup for lifecycle tests

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};

use sentinel_core::{Coordinate, PhoneNumber, SentinelConfig};
use sentinel_dispatch::testing::{
    facilities_near, RecordingAlert, ScriptedDiscovery, ScriptedLocation, ScriptedRouter,
};
use sentinel_dispatch::{Collaborators, DispatchEvent, DispatchHandle, DispatchService, MemorySurface};
use sentinel_state::MemoryStore;

pub const USER: Coordinate = Coordinate::new(12.9716, 77.5946);

/// A running dispatch service with scripted collaborators
pub struct TestRig {
    pub handle: DispatchHandle,
    pub events: broadcast::Receiver<DispatchEvent>,
    pub config: SentinelConfig,
    pub router: Arc<ScriptedRouter>,
    pub discovery: Arc<ScriptedDiscovery>,
    pub alert: Arc<RecordingAlert>,
    pub location: Arc<ScriptedLocation>,
    pub phones: Arc<MemoryStore>,
    pub surface: Arc<MemorySurface>,
}

pub struct RigBuilder {
    router: ScriptedRouter,
    discovery: ScriptedDiscovery,
    location: ScriptedLocation,
    phones: MemoryStore,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            router: ScriptedRouter::road(20),
            discovery: ScriptedDiscovery::new(facilities_near(USER, 3)),
            location: ScriptedLocation::at(USER),
            phones: MemoryStore::new(),
        }
    }

    pub fn router(mut self, router: ScriptedRouter) -> Self {
        self.router = router;
        self
    }

    pub fn discovery(mut self, discovery: ScriptedDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn location(mut self, location: ScriptedLocation) -> Self {
        self.location = location;
        self
    }

    pub fn stored_phone(mut self, phone: &str) -> Self {
        self.phones = MemoryStore::with_phone(PhoneNumber::parse(phone).expect("valid phone"));
        self
    }

    pub fn spawn(self) -> TestRig {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sentinel_dispatch=debug")
            .try_init();

        let config = SentinelConfig::default();
        let router = Arc::new(self.router);
        let discovery = Arc::new(self.discovery);
        let alert = Arc::new(RecordingAlert::new());
        let location = Arc::new(self.location);
        let phones = Arc::new(self.phones);
        let surface = Arc::new(MemorySurface::new());

        let collaborators = Collaborators {
            router: router.clone(),
            discovery: discovery.clone(),
            alert: alert.clone(),
            geolocation: location.clone(),
            phones: phones.clone(),
            surface: surface.clone(),
        };

        let (service, handle, events) = DispatchService::new(&config, collaborators);
        tokio::spawn(service.with_seed(42).run());

        TestRig {
            handle,
            events,
            config,
            router,
            discovery,
            alert,
            location,
            phones,
            surface,
        }
    }
}

impl TestRig {
    /// Next event matching `pred`, skipping the rest
    pub async fn wait_for(&mut self, pred: impl Fn(&DispatchEvent) -> bool) -> DispatchEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(120), self.events.recv()).await {
                Ok(Ok(event)) if pred(&event) => return event,
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) => panic!("event stream closed"),
                Err(_) => panic!("timed out waiting for event"),
            }
        }
    }

    /// Events already queued, without waiting
    pub fn drain(&mut self) -> Vec<DispatchEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
