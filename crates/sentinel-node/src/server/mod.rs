//! API server
//!
//! REST endpoints drive the dispatch lifecycle; the WebSocket streams
//! lifecycle events to map front-ends.

pub mod messages;
pub mod rest;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Node info
        .route("/api/info", get(rest::node_info))
        // WebSocket endpoint
        .route("/ws", get(websocket::ws_handler))
        // Lifecycle
        .route("/api/session", get(rest::get_session))
        .route("/api/sos", post(rest::trigger_sos))
        .route("/api/phone", post(rest::capture_phone))
        .route("/api/mode", post(rest::choose_mode))
        .route("/api/alert/confirm", post(rest::confirm_alert))
        .route("/api/facilities/rescan", post(rest::rescan))
        .route("/api/facilities/select", post(rest::select_facility))
        .route("/api/navigation/start", post(rest::start_navigation))
        .route("/api/cancel", post(rest::cancel))
        .route("/api/arrival/ack", post(rest::acknowledge_arrival))
        // Position and map
        .route("/api/location", post(rest::update_location))
        .route("/api/map", get(rest::get_map))
        .route("/api/stats", get(rest::get_stats))
        // CORS for browser clients
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
