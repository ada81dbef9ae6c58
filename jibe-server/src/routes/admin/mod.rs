pub mod users;

use crate::middleware::auth;
use crate::state::AppState;

use axum::{
    middleware::{self},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

// Routes nested under `/admin` (user provisioning, point grants).
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(users::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ))
}

#[derive(OpenApi)]
#[openapi()]
pub struct AdminApi;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = AdminApi::openapi();
    spec.merge(users::UsersApi::openapi());
    spec
}
