//! Balance statistics and ledger history for the calling user.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use jibe_types::{
    ErrorBody, LedgerEntry, Pagination, PointsHistoryResponse, PointsStats, PointsStatsResponse,
    ReasonTotal, GENERATION_COST,
};

use crate::entities::{PointsStore, TaskStore, UserStore};
use crate::error::ServerError;
use crate::middleware::AuthUser;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(OpenApi)]
#[openapi(
    paths(points_stats, points_history),
    components(schemas(
        PointsStatsResponse,
        PointsStats,
        ReasonTotal,
        PointsHistoryResponse,
        LedgerEntry,
        Pagination
    ))
)]
pub struct PointsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/points/stats", get(points_stats))
        .route("/points/history", get(points_history))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Entries per page, 1 to 100 (default 10).
    pub page_size: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/points/stats",
    tag = "points",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Balance and per-reason totals", body = PointsStatsResponse),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
    )
)]
pub async fn points_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PointsStatsResponse>, ServerError> {
    let current_points = state
        .store
        .get_points(&user.id)
        .await?
        .ok_or(ServerError::Unauthenticated)?;
    let transaction_stats = state
        .store
        .transaction_stats(&user.id)
        .await?
        .into_iter()
        .map(|(reason, total)| ReasonTotal { reason, total })
        .collect();
    let generations_count = state.store.count_completed(&user.id).await?;

    Ok(Json(PointsStatsResponse {
        data: PointsStats {
            current_points,
            transaction_stats,
            generations_count,
            remaining_generations: current_points / GENERATION_COST,
        },
        success: true,
    }))
}

#[utoipa::path(
    get,
    path = "/api/points/history",
    tag = "points",
    security(("bearer" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "One page of the ledger, newest first", body = PointsHistoryResponse),
        (status = 400, description = "Invalid paging parameters", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
    )
)]
pub async fn points_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<PointsHistoryResponse>, ServerError> {
    let Query(q) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let page = q.page.unwrap_or(1);
    let page_size = q.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(ServerError::BadRequest("page must be at least 1".into()));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ServerError::BadRequest(format!(
            "pageSize must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let (records, total) = state
        .store
        .list_transactions(&user.id, page, page_size)
        .await?;

    Ok(Json(PointsHistoryResponse {
        data: records.iter().map(|r| r.to_entry()).collect(),
        pagination: Pagination::new(total, page, page_size),
        success: true,
    }))
}
