//! Health Check Endpoint
//!
//! `GET /health` reports the record store round trip and process uptime.
//! No authentication required.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub database_latency_ms: u64,
}

/// GET /health - Liveness plus database connectivity
pub async fn health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();
    if let Err(e) = state.store.ping().await {
        tracing::error!(error = %e, "Health check failed: record store unreachable");
        return Err(ApiError::service_unavailable("Database unavailable"));
    }

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database_latency_ms: started.elapsed().as_millis() as u64,
    };
    // Uptime changes every call
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
