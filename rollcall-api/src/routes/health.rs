//! Health Check Endpoint
//!
//! `GET /health` reports liveness plus a summary of governance state.
//! No authentication and no rate limiting.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::Governance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub governance: GovernanceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSummary {
    pub rate_limit_enabled: bool,
    pub cache_entries: usize,
    pub cache_hit_rate: f64,
    /// Clients with a live API limiter counter.
    pub tracked_clients: usize,
    /// Identities with failed credential attempts on record.
    pub tracked_identities: usize,
    pub running_sweepers: usize,
}

/// GET /health
pub async fn health(State(governance): State<Governance>) -> impl IntoResponse {
    let stats = governance.cache.stats();
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: governance.start_time.elapsed().as_secs(),
        governance: GovernanceSummary {
            rate_limit_enabled: governance.config.rate_limit_enabled,
            cache_entries: stats.entry_count as usize,
            cache_hit_rate: stats.hit_rate(),
            tracked_clients: governance.api_limiter.tracked_clients(),
            tracked_identities: governance.lockout.tracked_identities(),
            running_sweepers: governance.running_sweepers(),
        },
    };
    (StatusCode::OK, Json(response))
}

pub fn create_router(governance: Governance) -> Router {
    Router::new().route("/health", get(health)).with_state(governance)
}
