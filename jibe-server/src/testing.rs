//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jibe_types::ChatMessage;
use serde_json::Value;
use tower::ServiceExt;

use crate::config::{Config, LlmConfig};
use crate::entities::{memory_store, SqliteStore, TaskRecord, TaskStore};
use crate::generation::{ChatCompletion, GenerationClient, GenerationError, GenerationParams};
use crate::moderation::WordlistModerator;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::state::AppState;

/// What the fake upstream does on each call.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(String),
    /// A completion with no choices at all.
    Empty,
    Sleep(Duration),
    AuthError,
    Panic,
}

pub struct FakeGenerator {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    last: Mutex<Vec<ChatMessage>>,
}

impl FakeGenerator {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            last: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for FakeGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ChatCompletion, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = messages.to_vec();
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Reply(text) => Ok(ChatCompletion::from_text(text)),
            Behavior::Empty => Ok(ChatCompletion::default()),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(ChatCompletion::from_text("too late"))
            }
            Behavior::AuthError => Err(GenerationError::Auth("invalid api key".into())),
            Behavior::Panic => panic!("fake upstream exploded"),
        }
    }
}

/// Poll the store until the task reaches a terminal state.
pub async fn wait_terminal(store: &SqliteStore, id: &str) -> TaskRecord {
    for _ in 0..400 {
        let task = store.get_task(id).await.unwrap().expect("task exists");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} did not reach a terminal state");
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".into(),
        database_url: "sqlite::memory:".into(),
        log_level: "info".into(),
        log_json: false,
        cors_allowed_origins: None,
        enable_swagger: false,
        admin_token: Some("admin-secret".into()),
        llm: LlmConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:9".into(),
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
            system_prompt: "persona".into(),
        },
        banned_phrases: vec!["forbidden".into()],
        queue_capacity: 8,
        workers: 1,
        site_url: "https://jibe.example".into(),
        referral_bonus: 0,
    }
}

/// Full application state over an in-memory store and a fake upstream.
pub async fn test_state(behavior: Behavior) -> (Arc<AppState>, Arc<FakeGenerator>) {
    let config = test_config();
    let store = Arc::new(memory_store().await);
    let generator = Arc::new(FakeGenerator::new(behavior));
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Some(generator.clone() as Arc<dyn GenerationClient>),
        Arc::new(WordlistModerator::new(config.banned_phrases.clone())),
        PipelineSettings {
            system_prompt: config.llm.system_prompt.clone(),
            timeout: config.llm.timeout,
            params: GenerationParams::default(),
        },
        config.queue_capacity,
    );
    orchestrator.start_workers(config.workers);
    let state = Arc::new(AppState {
        config: Arc::new(config),
        store,
        orchestrator,
    });
    (state, generator)
}

/// Send one request through the router and decode the JSON answer.
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
