//! HTTP API module - REST endpoints and WebSocket

mod combat;
mod websocket;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broadcast::BroadcastHub;
use crate::combat::{CombatError, CombatManager};
use crate::db::Database;

/// Header carrying the caller's user id, set by the auth layer in front of us
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub combat: Arc<CombatManager>,
    pub hub: BroadcastHub,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .merge(combat::router())
        .merge(websocket::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a combat failure onto an HTTP status
pub(crate) fn combat_error_response(err: CombatError) -> Response {
    let status = match &err {
        CombatError::Validation(_) => StatusCode::BAD_REQUEST,
        CombatError::NotFound(_) => StatusCode::NOT_FOUND,
        CombatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CombatError::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Combat request failed");
    }
    error_response(status, err.to_string())
}

/// Caller identity from the auth header
pub(crate) fn caller(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing x-user-id header"))
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "combatd",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                database: "error",
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}
