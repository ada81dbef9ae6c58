pub mod generate;
pub mod points;
pub mod referral;
pub mod share;

use crate::middleware::auth;
use crate::state::AppState;

use axum::{
    middleware::{self},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

/// Routes nested under `/api`.  All but the share-click beacon need a user
/// bearer token.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(generate::router())
        .merge(points::router())
        .merge(share::router())
        .merge(referral::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ))
        // Merged after the layer so it stays public.
        .merge(share::public_router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct UserApi;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = UserApi::openapi();
    spec.merge(generate::GenerateApi::openapi());
    spec.merge(points::PointsApi::openapi());
    spec.merge(share::ShareApi::openapi());
    spec.merge(referral::ReferralApi::openapi());
    spec
}
