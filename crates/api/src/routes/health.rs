use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use latchkey_core::registry::RegistryError;
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the device registry answered its health check.
    pub registry_healthy: bool,
    pub connections: usize,
    pub channels: usize,
    pub tracked_devices: usize,
}

/// GET /health -- returns service, registry and relay health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry_healthy = tokio::time::timeout(
        state.config.relay.registry_timeout,
        state.registry.health_check(),
    )
    .await
    .is_ok_and(|check| check.is_ok());

    let status = if registry_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        registry_healthy,
        connections: state.ws_manager.connection_count().await,
        channels: state.relay.channels().channel_count(),
        tracked_devices: state.relay.presence().tracked_devices(),
    })
}

/// GET /ready -- 204 when the device registry answers in time, otherwise the
/// registry error (503 for unreachable or slow).
async fn readiness(State(state): State<AppState>) -> AppResult<StatusCode> {
    tokio::time::timeout(
        state.config.relay.registry_timeout,
        state.registry.health_check(),
    )
    .await
    .map_err(|_| RegistryError::Timeout)??;

    Ok(StatusCode::NO_CONTENT)
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
}
