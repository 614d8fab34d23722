//! Sentinel Dispatch - Emergency dispatch and navigation lifecycle
//!
//! This crate drives one SOS from trigger to arrival: emergency contact
//! capture, civilian or ambulance mode, facility discovery and ranking,
//! routing with straight-line fallback, and simulated or tracked movement
//! along the route.
//!
//! # Overview
//!
//! - **Session**: A pure state machine; every transition checks its phase
//! - **Service**: Single-owner event loop applying commands, completions and ticks
//! - **Scheduler**: Per-class repeating timers with generation tokens
//! - **Movement**: Cursor advancement, remaining distance, ETA and turn hints
//! - **Surface**: Keyed map layers kept in memory for a front-end
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sentinel_core::{Coordinate, SentinelConfig};
//! use sentinel_dispatch::testing::{
//!     facilities_near, RecordingAlert, ScriptedDiscovery, ScriptedLocation, ScriptedRouter,
//! };
//! use sentinel_dispatch::{Collaborators, DispatchService, MemorySurface, Mode};
//! # use sentinel_core::{PhoneNumber, PhoneStore};
//! # struct NoPhone;
//! # #[async_trait::async_trait]
//! # impl PhoneStore for NoPhone {
//! #     async fn load_phone(&self) -> sentinel_core::Result<Option<PhoneNumber>> { Ok(None) }
//! #     async fn save_phone(&self, _: &PhoneNumber) -> sentinel_core::Result<()> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let here = Coordinate::new(12.9716, 77.5946);
//!     let collaborators = Collaborators {
//!         router: Arc::new(ScriptedRouter::road(20)),
//!         discovery: Arc::new(ScriptedDiscovery::new(facilities_near(here, 3))),
//!         alert: Arc::new(RecordingAlert::new()),
//!         geolocation: Arc::new(ScriptedLocation::at(here)),
//!         phones: Arc::new(NoPhone),
//!         surface: Arc::new(MemorySurface::new()),
//!     };
//!
//!     let (service, handle, mut events) =
//!         DispatchService::new(&SentinelConfig::default(), collaborators);
//!     tokio::spawn(service.run());
//!
//!     handle.trigger_sos().await?;
//!     handle.capture_phone("98765 43210").await?;
//!     handle.choose_mode(Mode::Civilian).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod enrichment;
pub mod error;
pub mod event;
pub mod movement;
pub mod origin;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod surface;
pub mod testing;

pub use enrichment::{enrich_and_rank, EnrichmentParams};
pub use error::{DispatchError, Result};
pub use event::{DispatchEvent, DispatchStats};
pub use movement::{Advance, LegKind, MovementParams, Progress};
pub use origin::generate_dispatch_origin;
pub use scheduler::{Tick, TickScheduler, TimerClass};
pub use service::{Collaborators, DispatchCommand, DispatchHandle, DispatchService};
pub use session::{DispatchSession, LegSummary, Legs, Mode, Phase, SessionId, SessionSnapshot};
pub use surface::{MapLayer, MapSnapshot, MemorySurface};
