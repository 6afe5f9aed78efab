//! Search Routes
//!
//! - POST /api/v1/presents/search-by-time - Presents and events between two dates

use axum::{extract::State, Json};
use chrono::DateTime;
use std::sync::Arc;

use super::unix_now;
use crate::api::dto::{ApiResponse, SearchByTimeRequest, SearchByTimeResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// POST /api/v1/presents/search-by-time
pub async fn search_by_time(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchByTimeRequest>,
) -> ApiResult<Json<ApiResponse<SearchByTimeResponse>>> {
    let from_time = parse_date("fromDate", &req.from_date)?;
    let to_time = parse_date("toDate", &req.to_date)?;

    tracing::debug!(from_time, to_time, "Time-range search");
    let result = state.search.search(from_time, to_time).await?;

    Ok(Json(ApiResponse::ok(SearchByTimeResponse::from_result(
        &result,
        unix_now(),
    ))))
}

/// Parse an RFC 3339 date into unix seconds
fn parse_date(field: &str, raw: &str) -> ApiResult<u64> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| ApiError::Validation(format!("{} is not an RFC 3339 date: {}", field, e)))?;
    u64::try_from(parsed.timestamp())
        .map_err(|_| ApiError::Validation(format!("{} is before the unix epoch", field)))
}
