//! Generation task lifecycle.
//!
//! `submit` runs the synchronous checks (history shape, configuration,
//! balance, input moderation), persists the task in `processing` and pushes
//! its id onto a bounded queue.  A fixed pool of workers drains the queue and
//! drives each task through
//! upstream call -> response validation -> output moderation -> charge.
//!
//! The task table doubles as the durable job list: anything still
//! non-terminal at startup is re-enqueued by [`Orchestrator::recover`].
//! Every failure inside a worker, panics included, ends in a conditional
//! `failed` write; nothing propagates out of the worker loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use jibe_types::{ChatMessage, Role, GENERATION_COST};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::entities::{ChargeOutcome, SqliteStore, TaskStore, UserStore};
use crate::error::ServerError;
use crate::generation::{GenerationClient, GenerationError, GenerationParams};
use crate::moderation::ContentModerator;

/// Maximum total size of a submitted conversation.
pub const MAX_HISTORY_BYTES: usize = 128 * 1024; // 128 KiB

pub const OUTPUT_REJECTED_MESSAGE: &str = "content does not comply with policy";
const BUSY_MESSAGE: &str = "The server was too busy to accept this generation";
const UNEXPECTED_MESSAGE: &str = "The generation failed unexpectedly, please try again";

/// Fixed per-request settings for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub system_prompt: String,
    /// Bound on the upstream call, independent of the HTTP client's own.
    pub timeout: Duration,
    pub params: GenerationParams,
}

/// Why a background run ended in `failed`.
#[derive(Debug, thiserror::Error)]
enum PipelineFailure {
    #[error("generation service is not configured")]
    NotConfigured,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("generated content rejected by moderation")]
    OutputRejected,
    #[error("balance too low at charge time")]
    InsufficientPoints,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl PipelineFailure {
    fn user_message(&self) -> &'static str {
        match self {
            PipelineFailure::NotConfigured => "generation service is not configured",
            PipelineFailure::Generation(e) => e.user_message(),
            PipelineFailure::OutputRejected => OUTPUT_REJECTED_MESSAGE,
            PipelineFailure::InsufficientPoints => {
                "Insufficient points to complete the generation; no points were charged"
            }
            PipelineFailure::Store(_) => "Failed to save the generation result, please try again",
        }
    }
}

enum PipelineOutcome {
    Completed { remaining: i64 },
    /// Missing task, or one that already reached a terminal state.
    Skipped,
}

pub struct Orchestrator {
    store: Arc<SqliteStore>,
    generator: Option<Arc<dyn GenerationClient>>,
    moderator: Arc<dyn ContentModerator>,
    settings: PipelineSettings,
    queue_tx: flume::Sender<String>,
    queue_rx: flume::Receiver<String>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("configured", &self.generator.is_some())
            .field("queued", &self.queue_tx.len())
            .finish()
    }
}

impl Orchestrator {
    /// `generator` is `None` when no upstream credentials are configured;
    /// submissions are then refused with [`ServerError::NotConfigured`].
    pub fn new(
        store: Arc<SqliteStore>,
        generator: Option<Arc<dyn GenerationClient>>,
        moderator: Arc<dyn ContentModerator>,
        settings: PipelineSettings,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = flume::bounded(queue_capacity.max(1));
        Arc::new(Self {
            store,
            generator,
            moderator,
            settings,
            queue_tx,
            queue_rx,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Validate, persist and enqueue a generation request.  Returns the task
    /// id as soon as the task is queued.
    pub async fn submit(
        &self,
        user_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ServerError> {
        let latest = validate_history(&messages)?;

        if !self.is_configured() {
            return Err(ServerError::NotConfigured);
        }

        let balance = self
            .store
            .get_points(user_id)
            .await?
            .ok_or(ServerError::Unauthenticated)?;
        if balance < GENERATION_COST {
            return Err(ServerError::InsufficientPoints {
                balance,
                required: GENERATION_COST,
            });
        }

        if !self.moderator.is_allowed(latest) {
            info!(user_id, "input rejected by moderation");
            return Err(ServerError::ContentRejected);
        }

        let task = self.store.create_task(user_id, &messages).await?;
        match self.queue_tx.try_send(task.id.clone()) {
            Ok(()) => {
                info!(task_id = %task.id, user_id, turns = messages.len(), "generation task queued");
                Ok(task.id)
            }
            Err(flume::TrySendError::Full(_)) => {
                warn!(task_id = %task.id, "generation queue full");
                self.store.fail_task(&task.id, BUSY_MESSAGE).await?;
                Err(ServerError::Busy)
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                self.store.fail_task(&task.id, BUSY_MESSAGE).await?;
                Err(ServerError::Internal("generation queue is closed".into()))
            }
        }
    }

    /// Spawn `count` workers draining the queue.
    pub fn start_workers(self: &Arc<Self>, count: usize) {
        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        for worker_id in 0..count.max(1) {
            let this = Arc::clone(self);
            let rx = self.queue_rx.clone();
            workers.push(tokio::spawn(
                async move {
                    while let Ok(task_id) = rx.recv_async().await {
                        this.run_isolated(task_id).await;
                    }
                }
                .instrument(info_span!("generation_worker", worker_id)),
            ));
        }
        info!(workers = workers.len(), "generation workers started");
    }

    /// Re-enqueue every task that was left non-terminal by a previous run.
    ///
    /// The list of tasks is read before this returns; call it before the
    /// listener accepts submissions so no new task is queued twice.  The ids
    /// are pushed from a background task, so a backlog larger than the queue
    /// waits on the workers without holding up startup.  Returns the number
    /// of tasks found.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, sqlx::Error> {
        let backlog = self.store.list_in_flight().await?;
        let count = backlog.len();
        if count == 0 {
            return Ok(0);
        }
        info!(count, "re-enqueueing in-flight generation tasks");

        let tx = self.queue_tx.clone();
        let handle = tokio::spawn(
            async move {
                for task_id in backlog {
                    if tx.send_async(task_id).await.is_err() {
                        warn!("generation queue closed during recovery");
                        return;
                    }
                }
                debug!(count, "recovered tasks all queued");
            }
            .instrument(info_span!("generation_recovery")),
        );
        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        workers.push(handle);
        Ok(count)
    }

    /// Stop all workers and any unfinished recovery.  Tasks they were
    /// processing stay non-terminal and are picked up again by the next
    /// [`recover`](Self::recover).
    pub fn shutdown(&self) {
        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in workers.drain(..) {
            handle.abort();
        }
        let queued = self.queue_tx.len();
        if queued > 0 {
            info!(queued, "generation workers stopped with queued tasks; they resume on restart");
        }
    }

    /// Run one task on its own tokio task so a panic in the pipeline is
    /// caught here and recorded instead of killing the worker.
    async fn run_isolated(self: &Arc<Self>, task_id: String) {
        let this = Arc::clone(self);
        let id = task_id.clone();
        let handle = tokio::spawn(
            async move { this.run_pipeline(&id).await }
                .instrument(info_span!("generation_task", task_id = %task_id)),
        );
        if let Err(e) = handle.await {
            error!(task_id = %task_id, error = %e, "generation pipeline aborted");
            self.record_failure(&task_id, UNEXPECTED_MESSAGE).await;
        }
    }

    async fn run_pipeline(&self, task_id: &str) {
        match self.execute(task_id).await {
            Ok(PipelineOutcome::Completed { remaining }) => {
                info!(remaining_points = remaining, "generation completed");
            }
            Ok(PipelineOutcome::Skipped) => {
                debug!("task already final or missing; skipped");
            }
            Err(failure) => {
                warn!(error = %failure, "generation failed");
                self.record_failure(task_id, failure.user_message()).await;
            }
        }
    }

    async fn execute(&self, task_id: &str) -> Result<PipelineOutcome, PipelineFailure> {
        let Some(task) = self.store.get_task(task_id).await? else {
            warn!("queued task no longer exists");
            return Ok(PipelineOutcome::Skipped);
        };
        if task.status.is_terminal() {
            return Ok(PipelineOutcome::Skipped);
        }
        let queued_ms = (Utc::now() - task.created_at).num_milliseconds();
        debug!(user_id = %task.user_id, queued_ms, "generation started");
        let generator = self.generator.as_ref().ok_or(PipelineFailure::NotConfigured)?;

        let outbound = build_outbound(&self.settings.system_prompt, &task.messages);
        let completion = tokio::time::timeout(
            self.settings.timeout,
            generator.complete(&outbound, &self.settings.params),
        )
        .await
        .map_err(|_| GenerationError::Timeout)??;

        let text = completion
            .text()
            .ok_or_else(|| GenerationError::MalformedResponse("first choice has no content".into()))?;

        if !self.moderator.is_allowed(text) {
            return Err(PipelineFailure::OutputRejected);
        }

        match self
            .store
            .complete_and_charge(task_id, text, GENERATION_COST)
            .await?
        {
            ChargeOutcome::Charged { remaining } => Ok(PipelineOutcome::Completed { remaining }),
            ChargeOutcome::InsufficientFunds => Err(PipelineFailure::InsufficientPoints),
            ChargeOutcome::AlreadyFinal => Ok(PipelineOutcome::Skipped),
        }
    }

    async fn record_failure(&self, task_id: &str, message: &str) {
        match self.store.fail_task(task_id, message).await {
            Ok(true) => {}
            Ok(false) => debug!(task_id, "task already final; failure not recorded"),
            // Left non-terminal; the next recovery pass retries it.
            Err(e) => error!(task_id, error = %e, "failed to record task failure"),
        }
    }
}

/// Check the conversation shape and return the latest user message.
fn validate_history(messages: &[ChatMessage]) -> Result<&str, ServerError> {
    let last = messages
        .last()
        .ok_or_else(|| ServerError::BadRequest("messages must not be empty".into()))?;
    if last.role != Role::User {
        return Err(ServerError::BadRequest(
            "the last message must be the current user turn".into(),
        ));
    }
    if last.content.trim().is_empty() {
        return Err(ServerError::BadRequest("the current user message is empty".into()));
    }
    let total: usize = messages.iter().map(|m| m.content.len()).sum();
    if total > MAX_HISTORY_BYTES {
        return Err(ServerError::BadRequest(format!(
            "conversation too large ({total} bytes); maximum is {MAX_HISTORY_BYTES} bytes"
        )));
    }
    Ok(&last.content)
}

/// The fixed system instruction followed by the caller's history, verbatim.
fn build_outbound(system_prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut outbound = Vec::with_capacity(history.len() + 1);
    outbound.push(ChatMessage::system(system_prompt));
    outbound.extend(history.iter().cloned());
    outbound
}

// ── Tests ──────────────────────────────────────────────────────────────────────
