use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::entities::UserStore;
use crate::error::ServerError;
use crate::state::AppState;

/// The caller resolved from the bearer token, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Resolve `Authorization: Bearer <token>` to a user or answer 401.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let token = bearer_token(req.headers()).ok_or(ServerError::Unauthenticated)?;
    let user = state
        .store
        .find_user_by_token(&token)
        .await?
        .ok_or(ServerError::Unauthenticated)?;

    req.extensions_mut().insert(AuthUser { id: user.id });
    Ok(next.run(req).await)
}

/// The caller behind a bearer token, for routes that also serve anonymous
/// visitors.  A missing or unknown token yields `None`.
pub async fn optional_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthUser>, ServerError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    let user = state.store.find_user_by_token(&token).await?;
    Ok(user.map(|u| AuthUser { id: u.id }))
}

/// Guard for `/admin`: the bearer token must equal `JIBE_ADMIN_TOKEN`.
/// With no admin token configured every admin request is refused.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(ServerError::Unauthenticated)?;
    match bearer_token(req.headers()) {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => Err(ServerError::Unauthenticated),
    }
}
