//! OpenAI-compatible chat-completions client (DeepSeek by default).

use std::time::Duration;

use async_trait::async_trait;
use jibe_types::ChatMessage;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ChatCompletion, GenerationClient, GenerationError, GenerationParams};

/// Upstream error bodies are truncated to this many bytes before logging.
const MAX_ERROR_BODY: usize = 512;

/// Talks to `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    params: &'a GenerationParams,
    stream: bool,
}

impl OpenAiCompatibleClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("jibe-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, api_key, base_url, model))
    }

    /// Use a pre-built HTTP client (proxy, TLS or timeout settings).
    pub fn with_client(
        client: Client,
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatCompletion, GenerationError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            params,
            stream: false,
        };
        debug!(model = %self.model, messages = messages.len(), "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), error = %err, "upstream returned an error");
            return Err(err);
        }

        response.json::<ChatCompletion>().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::MalformedResponse(e.to_string())
            }
        })
    }
}

fn classify_transport(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e)
    }
}

/// Map a non-2xx upstream answer onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = error_detail(body);
    let lowered = detail.to_ascii_lowercase();
    let mentions_model = lowered.contains("model")
        && (lowered.contains("not exist")
            || lowered.contains("not found")
            || lowered.contains("model_not_found"));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth(detail),
        _ if mentions_model => GenerationError::ModelNotFound(detail),
        StatusCode::NOT_FOUND => GenerationError::ModelNotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            GenerationError::InvalidParams(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GenerationError::Timeout,
        _ => GenerationError::Upstream {
            status: status.as_u16(),
            body: detail,
        },
    }
}

/// Prefer `error.message` from an OpenAI-style error body, else the raw text.
fn error_detail(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_owned))
        })
        .unwrap_or_else(|| body.to_owned());
    truncate(message, MAX_ERROR_BODY)
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, timeout: Duration) -> OpenAiCompatibleClient {
        let http = Client::builder().no_proxy().timeout(timeout).build().unwrap();
        OpenAiCompatibleClient::with_client(http, "sk-test", base, "deepseek-reasoner")
    }

    fn history() -> Vec<ChatMessage> {
        vec![ChatMessage::system("persona"), ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn sends_model_messages_and_fixed_params() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": body.to_string() } }] }))
            }),
        );
        let base = serve(router).await;

        let completion = client(&base, Duration::from_secs(5))
            .complete(&history(), &GenerationParams::default())
            .await
            .unwrap();
        let sent: Value = serde_json::from_str(completion.text().unwrap()).unwrap();

        assert_eq!(sent["model"], "deepseek-reasoner");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["max_tokens"], 800);
        assert!((sent["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((sent["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((sent["presence_penalty"].as_f64().unwrap() - 0.6).abs() < 1e-6);
        assert!((sent["frequency_penalty"].as_f64().unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(
            sent["messages"],
            json!([
                { "role": "system", "content": "persona" },
                { "role": "user", "content": "hello" }
            ])
        );
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "Authentication Fails (no such user)" } })),
                )
            }),
        );
        let base = serve(router).await;
        let err = client(&base, Duration::from_secs(5))
            .complete(&history(), &GenerationParams::default())
            .await
            .unwrap_err();
        match err {
            GenerationError::Auth(detail) => assert!(detail.contains("Authentication Fails")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "choices": [] }))
            }),
        );
        let base = serve(router).await;
        let err = client(&base, Duration::from_millis(200))
            .complete(&history(), &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let router = Router::new().route("/chat/completions", post(|| async { "not json" }));
        let base = serve(router).await;
        let err = client(&base, Duration::from_secs(5))
            .complete(&history(), &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)), "got {err:?}");
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"error":{"message":"Model Not Exist"}}"#),
            GenerationError::ModelNotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "nope"),
            GenerationError::ModelNotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"error":{"message":"temperature out of range"}}"#),
            GenerationError::InvalidParams(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::GATEWAY_TIMEOUT, ""),
            GenerationError::Timeout
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "oops"),
            GenerationError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn error_detail_is_bounded() {
        let long = "é".repeat(MAX_ERROR_BODY);
        assert!(error_detail(&long).len() <= MAX_ERROR_BODY);
        assert_eq!(error_detail(r#"{"error":"plain"}"#), "plain");
    }
}
