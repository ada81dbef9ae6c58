//! Share-link tracking.
//!
//! `POST /api/share/click` is public: anonymous visitors following a link
//! are counted too, and a valid bearer token only marks the click as
//! logged in.  `GET /api/share/stats` needs the sharer's own token.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tracing::info;
use utoipa::OpenApi;

use jibe_types::{
    share_link, ErrorBody, ShareClick, ShareClickRequest, ShareClickResponse, ShareStats,
    ShareStatsResponse,
};

use crate::entities::ShareStore;
use crate::error::ServerError;
use crate::middleware::auth::optional_user;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(record_share_click, share_stats),
    components(schemas(
        ShareClickRequest,
        ShareClick,
        ShareClickResponse,
        ShareStats,
        ShareStatsResponse
    ))
)]
pub struct ShareApi;

/// Routes that require a user token.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/share/stats", get(share_stats))
}

/// Routes open to anonymous visitors.
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/share/click", post(record_share_click))
}

#[utoipa::path(
    post,
    path = "/api/share/click",
    tag = "share",
    request_body = ShareClickRequest,
    responses(
        (status = 200, description = "Click recorded", body = ShareClickResponse),
        (status = 400, description = "Missing sharer id", body = ErrorBody),
        (status = 404, description = "Sharer does not exist", body = ErrorBody),
    )
)]
pub async fn record_share_click(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ShareClickRequest>, JsonRejection>,
) -> Result<Json<ShareClickResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let sharer_id = req
        .sharer_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing sharer id".into()))?;
    let visitor = optional_user(&state, &headers).await?;

    let click = state
        .store
        .record_click(sharer_id, visitor.as_ref().map(|v| v.id.as_str()))
        .await?
        .ok_or_else(|| ServerError::NotFound("Sharer not found".into()))?;
    info!(sharer_id, logged_in = click.logged_in, "share click recorded");

    Ok(Json(ShareClickResponse {
        data: ShareClick {
            id: click.id,
            logged_in: click.logged_in,
        },
        success: true,
    }))
}

#[utoipa::path(
    get,
    path = "/api/share/stats",
    tag = "share",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Clicks, referrals and the caller's share link", body = ShareStatsResponse),
        (status = 401, description = "Missing or unknown token", body = ErrorBody),
    )
)]
pub async fn share_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ShareStatsResponse>, ServerError> {
    let counts = state.store.share_stats(&user.id).await?;
    Ok(Json(ShareStatsResponse {
        data: ShareStats {
            total_clicks: counts.total_clicks,
            successful_referrals: counts.successful_referrals,
            points_earned: counts.points_earned,
            share_link: share_link(&state.config.site_url, &user.id),
        },
        success: true,
    }))
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::entities::UserStore;
    use crate::routes::build;
    use crate::testing::{call, test_state, Behavior};

    #[tokio::test]
    async fn anonymous_and_logged_in_clicks_are_counted() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let (sharer, sharer_token) = state.store.create_user("ana", 0).await.unwrap();
        let (_, visitor_token) = state.store.create_user("ben", 0).await.unwrap();
        let app = build(state);
        let body = json!({ "sharerId": sharer.id });

        let (status, resp) =
            call(&app, "POST", "/api/share/click", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["loggedIn"], false);

        let (status, resp) =
            call(&app, "POST", "/api/share/click", Some(&visitor_token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["loggedIn"], true);

        // An unknown token is treated as an anonymous visit.
        let (status, resp) =
            call(&app, "POST", "/api/share/click", Some("jb_stale"), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["loggedIn"], false);

        let (status, resp) = call(&app, "GET", "/api/share/stats", Some(&sharer_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["totalClicks"], 3);
        assert_eq!(resp["data"]["successfulReferrals"], 0);
        assert_eq!(resp["data"]["pointsEarned"], 0);
        assert_eq!(
            resp["data"]["shareLink"],
            format!("https://jibe.example/?ref={}", sharer.id)
        );
    }

    #[tokio::test]
    async fn click_needs_a_known_sharer() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let app = build(state);

        let (status, resp) = call(&app, "POST", "/api/share/click", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["success"], false);

        let (status, resp) = call(
            &app,
            "POST",
            "/api/share/click",
            None,
            Some(json!({ "sharerId": "nobody" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(resp["success"], false);
    }

    #[tokio::test]
    async fn stats_require_a_token() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let app = build(state);
        let (status, _) = call(&app, "GET", "/api/share/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
