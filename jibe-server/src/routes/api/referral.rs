use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use tracing::info;
use utoipa::OpenApi;

use jibe_types::{CreateReferralRequest, ErrorBody, Referral, ReferralResponse};

use crate::entities::{format_ts, ReferralOutcome, ShareStore};
use crate::error::ServerError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_referral),
    components(schemas(CreateReferralRequest, Referral, ReferralResponse))
)]
pub struct ReferralApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/referral/create", post(create_referral))
}

/// Record that the caller signed up through `referrerId`'s link.
#[utoipa::path(
    post,
    path = "/api/referral/create",
    tag = "share",
    security(("bearer" = [])),
    request_body = CreateReferralRequest,
    responses(
        (status = 200, description = "Referral recorded", body = ReferralResponse),
        (status = 400, description = "Missing referrer, self-referral, or already referred", body = ErrorBody),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
        (status = 404, description = "Referrer does not exist", body = ErrorBody),
    )
)]
pub async fn create_referral(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateReferralRequest>, JsonRejection>,
) -> Result<Json<ReferralResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let referrer_id = req
        .referrer_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing referrer id".into()))?;
    if referrer_id == user.id {
        return Err(ServerError::BadRequest("Users cannot refer themselves".into()));
    }

    let outcome = state
        .store
        .create_referral(referrer_id, &user.id, state.config.referral_bonus)
        .await?;
    let referral = match outcome {
        ReferralOutcome::Created(referral) => referral,
        ReferralOutcome::UnknownReferrer => {
            return Err(ServerError::NotFound("Referrer not found".into()));
        }
        ReferralOutcome::AlreadyReferred => {
            return Err(ServerError::BadRequest("User has already been referred".into()));
        }
    };
    info!(referrer_id, referred_id = %user.id, bonus = state.config.referral_bonus, "referral recorded");

    Ok(Json(ReferralResponse {
        data: Referral {
            id: referral.id,
            created_at: format_ts(referral.created_at),
        },
        success: true,
    }))
}
