//! Present Routes
//!
//! Read endpoints over the indexed presents.
//!
//! - GET /api/v1/presents?page=&limit= - Page through presents in index order
//! - GET /api/v1/presents/:id - Get one present

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use super::unix_now;
use crate::api::dto::{ApiResponse, ListPresentsParams, PresentDto, PresentListResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::store::PresentId;

const DEFAULT_PAGE_SIZE: usize = 10;

/// GET /api/v1/presents
pub async fn list_presents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPresentsParams>,
) -> ApiResult<Json<ApiResponse<PresentListResponse>>> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page == 0 {
        return Err(ApiError::Validation("page starts at 1".to_string()));
    }
    if limit == 0 || limit > state.config.max_page_size {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            state.config.max_page_size
        )));
    }

    let result = state.store.list(page, limit).await;
    let now = unix_now();

    Ok(Json(ApiResponse::ok(PresentListResponse {
        presents: result
            .items
            .iter()
            .map(|p| PresentDto::from_present(p, now))
            .collect(),
        total: result.total,
        page: result.page,
        limit: result.page_size,
    })))
}

/// GET /api/v1/presents/:id
pub async fn get_present(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<PresentDto>>> {
    let id = parse_present_id(&id)?;

    let present = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Present {} not found", id)))?;

    Ok(Json(ApiResponse::ok(PresentDto::from_present(&present, unix_now()))))
}

/// Accept a hex id of up to 32 bytes; shorter ids are left-padded
fn parse_present_id(raw: &str) -> ApiResult<PresentId> {
    let body = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    if body.is_empty() || body.len() > 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::Validation(format!(
            "Invalid present id '{}': expected up to 32 bytes of hex",
            raw
        )));
    }
    Ok(PresentId::new(format!("{:0>64}", body)))
}
