use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON bodies up to this size are logged verbatim.
const MAX_LOGGED_BODY: usize = 1024;

/// Largest request body buffered before the handlers see it.
pub const MAX_REQUEST_BODY: usize = 2 * 1024 * 1024; // 2 MiB

/// Wrap each request in an `http_request` span keyed by a trace id taken
/// from `x-trace-id` (or freshly generated) and echo that id back.
pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    // Admin answers carry freshly issued bearer tokens.
    let log_bodies = !path.starts_with("/admin");

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();
        let mut response = match read_request_body(body).await {
            Ok(req_bytes) => {
                log_body("request", &parts.headers, &req_bytes, log_bodies);
                let mut req = Request::from_parts(parts, Body::from(req_bytes));
                if let Some(value) = trace_header.clone() {
                    req.headers_mut().insert(X_TRACE_ID, value);
                }

                let response = next.run(req).await;

                let (parts, body) = response.into_parts();
                let res_bytes = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => {
                        warn!(error = %e, "failed to buffer response body");
                        Bytes::new()
                    }
                };
                log_body("response", &parts.headers, &res_bytes, log_bodies);
                Response::from_parts(parts, Body::from(res_bytes))
            }
            Err(e) => {
                warn!(error = %e, "request body rejected");
                e.into_response()
            }
        };
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Buffer the request body, refusing anything over [`MAX_REQUEST_BODY`].
async fn read_request_body(body: Body) -> Result<Bytes, ServerError> {
    match Limited::new(body, MAX_REQUEST_BODY).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ServerError::PayloadTooLarge {
                limit: MAX_REQUEST_BODY,
            })
        }
        Err(e) => Err(ServerError::BadRequest(format!(
            "failed to read request body: {e}"
        ))),
    }
}

/// Log a buffered body when it is small JSON and logging is allowed.
fn log_body(direction: &str, headers: &HeaderMap, bytes: &Bytes, allowed: bool) {
    if !allowed || bytes.is_empty() {
        return;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.contains("application/json") && bytes.len() < MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(bytes) {
            info!(direction, body = %text, "body");
        }
    } else {
        info!(direction, content_type, size = bytes.len(), "body skipped");
    }
}
