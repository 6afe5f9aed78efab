//! Indexer Routes
//!
//! - GET /api/v1/indexer/status - Store counters and controller phase
//! - POST /api/v1/indexer/reindex - Rescan from a block (default: deployment block)

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{ApiResponse, CycleReportDto, IndexerStatusResponse, ReindexRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// GET /api/v1/indexer/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<IndexerStatusResponse>> {
    let status = state.store.status().await;
    let phase = state.controller.phase().await;
    Json(ApiResponse::ok(IndexerStatusResponse::new(status, phase)))
}

/// POST /api/v1/indexer/reindex
///
/// Waits for any in-flight poll cycle, then rescans up to the head.
pub async fn reindex(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ReindexRequest>>,
) -> ApiResult<Json<ApiResponse<CycleReportDto>>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let from_block = request
        .from_block
        .unwrap_or(state.controller.config().start_block);

    tracing::info!(from_block, "Manual reindex triggered");
    let report = state.controller.reindex_from_block(from_block).await?;

    Ok(Json(ApiResponse::ok(CycleReportDto::from(&report))))
}
