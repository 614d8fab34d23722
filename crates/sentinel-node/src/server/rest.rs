//! REST API endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use sentinel_core::{Coordinate, SentinelError};
use sentinel_dispatch::{DispatchError, DispatchStats, MapSnapshot, SessionSnapshot};

use super::messages::{ErrorBody, LocationRequest, ModeRequest, PhoneRequest, SelectFacilityRequest};
use crate::AppState;

/// Lifecycle error rendered as `{code, message}`
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DispatchError::UnknownFacility(_) => StatusCode::NOT_FOUND,
            DispatchError::Channel(_) => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_conflict() => StatusCode::CONFLICT,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            DispatchError::Core(e) if e.is_retriable() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        Self(DispatchError::Core(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.0.error_code(),
            message: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Node info endpoint
#[derive(Serialize)]
pub struct NodeInfo {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub has_position: bool,
}

pub async fn node_info(State(state): State<Arc<AppState>>) -> Json<NodeInfo> {
    Json(NodeInfo {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        has_position: state.location.latest().is_some(),
    })
}

/// Current session, `null` when none
pub async fn get_session(State(state): State<Arc<AppState>>) -> ApiResult<Option<SessionSnapshot>> {
    Ok(Json(state.dispatch.session().await?))
}

pub async fn trigger_sos(State(state): State<Arc<AppState>>) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.trigger_sos().await?))
}

pub async fn capture_phone(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhoneRequest>,
) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.capture_phone(req.phone).await?))
}

pub async fn choose_mode(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModeRequest>,
) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.choose_mode(req.mode).await?))
}

/// User confirms the alert message went out
pub async fn confirm_alert(State(state): State<Arc<AppState>>) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.confirm_alert_sent().await?))
}

pub async fn rescan(State(state): State<Arc<AppState>>) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.rescan().await?))
}

pub async fn select_facility(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectFacilityRequest>,
) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.select_facility(req.facility_id).await?))
}

pub async fn start_navigation(State(state): State<Arc<AppState>>) -> ApiResult<SessionSnapshot> {
    Ok(Json(state.dispatch.start_navigation().await?))
}

pub async fn cancel(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.dispatch.cancel().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn acknowledge_arrival(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.dispatch.acknowledge_arrival().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a position fix from the client
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Coordinate> {
    Ok(Json(state.location.update(req.lat, req.lng)?))
}

/// Map layers for rendering
pub async fn get_map(State(state): State<Arc<AppState>>) -> Json<MapSnapshot> {
    Json(state.surface.snapshot())
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<DispatchStats> {
    Ok(Json(state.dispatch.stats().await?))
}
