//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a `{ "error": ..., "success": false }` JSON body with an appropriate
//! status code.
//!
//! Internal errors (Database, Internal) are logged with full detail but only
//! a generic message is returned so that SQL or file paths never leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jibe_types::ErrorBody;
use thiserror::Error;
use tracing::error;

/// Errors surfaced synchronously by the HTTP layer.
///
/// Failures inside the generation pipeline never become a `ServerError`;
/// they are written into the task row and reported through polling.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No bearer token, or one that maps to no user.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Input moderation rejected the latest user message.
    #[error("content rejected")]
    ContentRejected,

    /// Balance below the cost of one generation.
    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    /// Missing task, or a task owned by someone else.  Both cases share one
    /// response so task ids cannot be discovered across users.
    #[error("task not found")]
    NotFoundOrUnauthorized,

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream generation service has no credentials configured.
    #[error("generation service is not configured")]
    NotConfigured,

    /// The generation queue is full.
    #[error("server busy")]
    Busy,

    /// Request body larger than the server accepts.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized, please log in first".to_owned(),
            ),
            ServerError::ContentRejected => (
                StatusCode::BAD_REQUEST,
                "Input contains disallowed content, please revise and try again".to_owned(),
            ),
            ServerError::InsufficientPoints { balance, required } => (
                StatusCode::FORBIDDEN,
                format!("Insufficient points: {required} required, {balance} available"),
            ),
            ServerError::NotFoundOrUnauthorized => (
                StatusCode::NOT_FOUND,
                "Task not found".to_owned(),
            ),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "generation service is not configured".to_owned(),
            ),
            ServerError::Busy => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Too many pending generations, please retry shortly".to_owned(),
            ),
            ServerError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Request body too large; the limit is {limit} bytes"),
            ),

            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        let body = ErrorBody {
            error: client_message,
            success: false,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ServerError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn insufficient_points_is_forbidden() {
        let (status, body) = render(ServerError::InsufficientPoints { balance: 5, required: 10 }).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("10"));
    }

    #[tokio::test]
    async fn internal_errors_are_not_leaked() {
        let (status, body) = render(ServerError::Internal("/var/lib/secret.db locked".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn not_configured_is_explicit() {
        let (status, body) = render(ServerError::NotConfigured).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "generation service is not configured");
    }
}
