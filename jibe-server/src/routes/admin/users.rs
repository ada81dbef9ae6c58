use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use jibe_types::{
    CreateUserRequest, CreatedUser, CreatedUserResponse, ErrorBody, GrantPointsRequest,
    UserPoints, UserPointsResponse, REASON_GRANT,
};

use crate::entities::UserStore;
use crate::error::ServerError;
use crate::state::AppState;

const MAX_REASON_LEN: usize = 64;

#[derive(OpenApi)]
#[openapi(
    paths(create_user, grant_points),
    components(schemas(
        CreateUserRequest,
        CreatedUser,
        CreatedUserResponse,
        GrantPointsRequest,
        UserPoints,
        UserPointsResponse
    ))
)]
pub struct UsersApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}/points", post(grant_points))
}

#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "admin",
    security(("bearer" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created; the token is shown only once", body = CreatedUserResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 401, description = "Missing or wrong admin token", body = ErrorBody),
    )
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    if req.initial_points < 0 {
        return Err(ServerError::BadRequest(
            "initialPoints must not be negative".into(),
        ));
    }
    let display_name = req.display_name.unwrap_or_default();

    let (user, token) = state
        .store
        .create_user(display_name.trim(), req.initial_points)
        .await?;
    info!(user_id = %user.id, points = user.points, "user created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            data: CreatedUser {
                user_id: user.id,
                token,
                points: user.points,
            },
            success: true,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/points",
    tag = "admin",
    security(("bearer" = [])),
    params(
        ("id" = String, Path, description = "User to credit")
    ),
    request_body = GrantPointsRequest,
    responses(
        (status = 200, description = "Points credited", body = UserPointsResponse),
        (status = 400, description = "Invalid amount or reason", body = ErrorBody),
        (status = 401, description = "Missing or wrong admin token", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
    )
)]
pub async fn grant_points(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<GrantPointsRequest>, JsonRejection>,
) -> Result<Json<UserPointsResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    if req.amount <= 0 {
        return Err(ServerError::BadRequest("amount must be positive".into()));
    }
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(REASON_GRANT);
    if reason.len() > MAX_REASON_LEN {
        return Err(ServerError::BadRequest(format!(
            "reason must be at most {MAX_REASON_LEN} bytes"
        )));
    }

    let points = state
        .store
        .grant_points(&id, req.amount, reason)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("user {id} not found")))?;
    info!(user_id = %id, amount = req.amount, reason, points, "points granted");

    Ok(Json(UserPointsResponse {
        data: UserPoints { user_id: id, points },
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

    const ADMIN: &str = "admin-secret";

    #[tokio::test]
    async fn admin_token_is_required() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let (_, user_token) = state.store.create_user("ana", 0).await.unwrap();
        let app = build(state);
        let body = json!({ "initialPoints": 10 });

        let (status, _) = call(&app, "POST", "/admin/users", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) =
            call(&app, "POST", "/admin/users", Some(&user_token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "POST", "/admin/users", Some(ADMIN), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn admin_routes_closed_without_configured_token() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let mut config = (*state.config).clone();
        config.admin_token = None;
        let state = std::sync::Arc::new(crate::state::AppState {
            config: std::sync::Arc::new(config),
            ..(*state).clone()
        });
        let app = build(state);

        let (status, _) =
            call(&app, "POST", "/admin/users", Some(ADMIN), Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn created_user_can_use_the_api() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let app = build(state);

        let (status, body) = call(
            &app,
            "POST",
            "/admin/users",
            Some(ADMIN),
            Some(json!({ "displayName": "ana", "initialPoints": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["points"], 30);
        let token = body["data"]["token"].as_str().unwrap().to_owned();

        let (status, body) = call(&app, "GET", "/api/points/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["currentPoints"], 30);
    }

    #[tokio::test]
    async fn negative_initial_points_rejected() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let app = build(state);
        let (status, body) = call(
            &app,
            "POST",
            "/admin/users",
            Some(ADMIN),
            Some(json!({ "initialPoints": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn grant_points_credits_existing_users() {
        let (state, _) = test_state(Behavior::Reply("hi".into())).await;
        let (user, _) = state.store.create_user("ana", 5).await.unwrap();
        let app = build(state.clone());

        let uri = format!("/admin/users/{}/points", user.id);
        let (status, body) =
            call(&app, "POST", &uri, Some(ADMIN), Some(json!({ "amount": 20, "reason": "promo" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["points"], 25);
        assert_eq!(state.store.get_points(&user.id).await.unwrap(), Some(25));

        let (status, _) = call(&app, "POST", &uri, Some(ADMIN), Some(json!({ "amount": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/admin/users/nobody/points",
            Some(ADMIN),
            Some(json!({ "amount": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }
}
