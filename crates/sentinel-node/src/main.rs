//! Sentinel Node - Emergency dispatch node with API server
//!
//! This binary runs the dispatch lifecycle with:
//! - OSRM road routing and Overpass/Gemini facility discovery
//! - WhatsApp alert links and SQLite-backed emergency contact
//! - REST API for driving the lifecycle
//! - WebSocket stream of lifecycle events for a map front-end

mod server;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sentinel_clients::{discovery_chain, OsrmClient, SharedLocation, StaticLocation, WhatsAppAlert};
use sentinel_core::config::{GeminiConfig, LogFormat, LoggingConfig};
use sentinel_core::{GeolocationProvider, PhoneStore, SentinelConfig};
use sentinel_dispatch::{Collaborators, DispatchEvent, DispatchHandle, DispatchService, MemorySurface};
use sentinel_state::{MemoryStore, SqliteStore};

#[derive(Parser)]
#[command(name = "sentinel-node")]
#[command(about = "Emergency dispatch node with REST and WebSocket API")]
struct Args {
    /// Configuration file (JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// HTTP server port (0 = auto-assign)
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Database path, overrides storage.database_url
    #[arg(long)]
    db: Option<String>,

    /// Initial latitude, until a client reports a position
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Initial longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Keep the position at --lat/--lng and ignore client reports
    #[arg(long, requires = "lat")]
    pin: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

/// Application state shared across handlers
pub struct AppState {
    /// Dispatch service handle
    pub dispatch: DispatchHandle,
    /// Position fed by clients
    pub location: SharedLocation,
    /// Current map layers
    pub surface: Arc<MemorySurface>,
    /// Node start time
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SentinelConfig::from_file(path)?,
        None => SentinelConfig::default(),
    };
    if let Some(db) = &args.db {
        config.storage.database_url = format!("sqlite:{}?mode=rwc", db);
    }
    if config.discovery.gemini.is_none() {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.discovery.gemini = Some(GeminiConfig::new(key));
            }
        }
    }

    init_logging(&config.logging, args.verbose)?;
    info!("Starting Sentinel node v{}", sentinel_core::VERSION);

    // Emergency contact survives restarts when the database is reachable
    let phones: Arc<dyn PhoneStore> = match SqliteStore::connect(&config.storage.database_url).await {
        Ok(store) => {
            info!("Database initialized: {}", config.storage.database_url);
            Arc::new(store)
        }
        Err(e) => {
            warn!("Database unavailable, emergency contact will not persist: {}", e);
            Arc::new(MemoryStore::new())
        }
    };

    let location = SharedLocation::new();
    let mut geolocation: Arc<dyn GeolocationProvider> = Arc::new(location.clone());
    if let (Some(lat), Some(lng)) = (args.lat, args.lng) {
        let fix = location.update(lat, lng)?;
        if args.pin {
            info!("Position pinned at {}", fix);
            geolocation = Arc::new(StaticLocation(fix));
        } else {
            info!("Initial position: {}", fix);
        }
    }

    let discovery = discovery_chain(&config.discovery)?;
    info!("Facility discovery sources: {}", discovery.len());

    let surface = Arc::new(MemorySurface::new());
    let collaborators = Collaborators {
        router: Arc::new(OsrmClient::new(&config.routing)?),
        discovery: Arc::new(discovery),
        alert: Arc::new(WhatsAppAlert::new(config.alert.clone())),
        geolocation,
        phones,
        surface: surface.clone(),
    };

    let (service, handle, mut events) = DispatchService::new(&config, collaborators);
    tokio::spawn(service.run());

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Event log lagged by {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = Arc::new(AppState {
        dispatch: handle.clone(),
        location,
        surface,
        start_time: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port)).await?;
    let port = listener.local_addr()?.port();

    info!("═══════════════════════════════════════════════════════════");
    info!("  REST API: http://127.0.0.1:{}/api/", port);
    info!("  WebSocket endpoint: ws://127.0.0.1:{}/ws", port);
    info!("═══════════════════════════════════════════════════════════");

    let app = server::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handle))
        .await?;

    info!("Sentinel node stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder().with_env_filter(filter);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

fn log_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::LocationFallback { reason, .. } => {
            warn!("Using default location: {}", reason)
        }
        DispatchEvent::Stopped => info!("Dispatch service stopped"),
        other => debug!("Dispatch event: {:?}", other),
    }
}

async fn shutdown_signal(handle: DispatchHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    if let Err(e) = handle.shutdown().await {
        warn!("Dispatch service already stopped: {}", e);
    }
}
