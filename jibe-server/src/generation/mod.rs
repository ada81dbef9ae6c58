//! Upstream text generation.
//!
//! [`GenerationClient`] is the seam between the orchestrator and the
//! external model API.  It is constructed once at startup from
//! [`crate::config::LlmConfig`] and shared by every worker; the shipped
//! implementation is [`openai::OpenAiCompatibleClient`].

pub mod openai;

use async_trait::async_trait;
use jibe_types::ChatMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiCompatibleClient;

/// Fixed decoding parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            max_tokens: 800,
            presence_penalty: 0.6,
            frequency_penalty: 0.5,
        }
    }
}

/// The subset of an OpenAI-style chat completion the pipeline inspects.
///
/// Everything is optional so that a structurally odd answer still decodes
/// and is reported as "unexpected response format" by the pipeline rather
/// than as a transport failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: Option<CompletionMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// A completion with a single choice holding `text`.
    #[cfg(test)]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![CompletionChoice {
                message: Some(CompletionMessage { content: Some(text.into()) }),
            }],
        }
    }

    /// Content of the first choice, if it is present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()?
            .message
            .as_ref()?
            .content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

/// Classified upstream failure.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream rejected the credentials: {0}")]
    Auth(String),

    #[error("upstream model not found: {0}")]
    ModelNotFound(String),

    #[error("upstream rejected the request parameters: {0}")]
    InvalidParams(String),

    #[error("upstream rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("unexpected upstream response format: {0}")]
    MalformedResponse(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),
}

impl GenerationError {
    /// Human-readable text stored on a failed task.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::Timeout => "The generation service timed out, please try again",
            GenerationError::Auth(_) => {
                "The generation service rejected the API key, please contact the administrator"
            }
            GenerationError::ModelNotFound(_) => {
                "The configured model is not available on the generation service"
            }
            GenerationError::InvalidParams(_) => {
                "The generation service rejected the request parameters"
            }
            GenerationError::RateLimited(_) => {
                "The generation service is overloaded, please try again later"
            }
            GenerationError::MalformedResponse(_) => "unexpected response format",
            GenerationError::Upstream { .. } | GenerationError::Transport(_) => {
                "The generation service failed to process the request, please try again later"
            }
        }
    }
}

/// Produces a completion for a full, already-prefixed message list.
#[async_trait]
pub trait GenerationClient: Send + Sync + 'static {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatCompletion, GenerationError>;
}
