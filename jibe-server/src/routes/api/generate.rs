//! Asynchronous chat generation.
//!
//! `POST /api/generate` checks the balance and moderates the newest user
//! turn, stores a `processing` task and answers 202 with the task id.  Points
//! are only charged once the task completes.  Clients then poll
//! `GET /api/generate/status?taskId=...` until the task is terminal.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use jibe_types::{ErrorBody, GenerateAccepted, GenerateRequest, StatusResponse};

use crate::entities::TaskStore;
use crate::error::ServerError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(submit_generation, generation_status),
    components(schemas(GenerateRequest, GenerateAccepted, StatusResponse, ErrorBody))
)]
pub struct GenerateApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(submit_generation))
        .route("/generate/status", get(generation_status))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Id returned by `POST /api/generate`.
    pub task_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/generate",
    tag = "generate",
    security(("bearer" = [])),
    request_body = GenerateRequest,
    responses(
        (status = 202, description = "Task accepted", body = GenerateAccepted),
        (status = 400, description = "Invalid history or content rejected", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
        (status = 403, description = "Not enough points", body = ErrorBody),
        (status = 503, description = "Generation queue is full", body = ErrorBody),
    )
)]
pub async fn submit_generation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateAccepted>), ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let task_id = state.orchestrator.submit(&user.id, req.messages).await?;
    Ok((StatusCode::ACCEPTED, Json(GenerateAccepted::new(task_id))))
}

#[utoipa::path(
    get,
    path = "/api/generate/status",
    tag = "generate",
    security(("bearer" = [])),
    params(StatusQuery),
    responses(
        (status = 200, description = "Current task state", body = StatusResponse),
        (status = 400, description = "Missing task id", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
        (status = 404, description = "Unknown task or owned by someone else", body = ErrorBody),
    )
)]
pub async fn generation_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ServerError> {
    let task_id = q
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing task ID parameter".into()))?;

    let task = state
        .store
        .get_user_task(&task_id, &user.id)
        .await?
        .ok_or(ServerError::NotFoundOrUnauthorized)?;

    Ok(Json(task.to_status_response()))
}
