//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (backfill finished, indexer running)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{CacheStatsDto, HealthResponse};
use crate::api::state::AppState;
use crate::indexer::IndexPhase;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Ready once the initial backfill has run and the indexer has not stopped.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if is_serving(state.controller.phase().await) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with indexer details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let phase = state.controller.phase().await;
    let status = match phase {
        IndexPhase::Polling | IndexPhase::Reindexing => "healthy",
        IndexPhase::Idle | IndexPhase::Backfilling => "starting",
        IndexPhase::Stopped => "unhealthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        indexer: phase,
        last_processed_block: state.store.last_processed_block().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        search_cache: CacheStatsDto::from(state.search.cache().stats().await),
    })
}

fn is_serving(phase: IndexPhase) -> bool {
    matches!(phase, IndexPhase::Polling | IndexPhase::Reindexing)
}
