//! Client-driven status polling.
//!
//! A [`Poller`] asks for a task's status once per interval, waiting for each
//! answer before the next tick, until the task is terminal or the attempt
//! ceiling is reached.  The ceiling is a display concern only; the server
//! bounds the generation itself separately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jibe_types::{StatusResponse, TaskStatus};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ClientError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Anything that can report a task's current state.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn status(&self, task_id: &str) -> Result<StatusResponse, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn status(&self, task_id: &str) -> Result<StatusResponse, ClientError> {
        ApiClient::status(self, task_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { result: String, points: i64 },
    Failed { error: String },
    TimedOut { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Poller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll `task_id` until it completes, fails, or `max_attempts` checks
    /// have come back non-terminal.  The first check happens one interval
    /// after the call.
    ///
    /// Transport errors and 5xx answers use up an attempt and polling goes
    /// on; a 4xx answer (unknown task, revoked token) ends it as `Failed`.
    pub async fn poll<S: StatusSource + ?Sized>(&self, source: &S, task_id: &str) -> PollOutcome {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=self.max_attempts {
            ticker.tick().await;
            match source.status(task_id).await {
                Ok(resp) => match resp.status {
                    TaskStatus::Completed => {
                        info!(task_id, attempt, "task completed");
                        return PollOutcome::Completed {
                            result: resp.result.unwrap_or_default(),
                            points: resp.points.unwrap_or_default(),
                        };
                    }
                    TaskStatus::Failed => {
                        info!(task_id, attempt, "task failed");
                        return PollOutcome::Failed {
                            error: resp
                                .error
                                .unwrap_or_else(|| "Task processing failed".to_owned()),
                        };
                    }
                    status => debug!(task_id, attempt, %status, "task still running"),
                },
                Err(e) if e.is_permanent() => {
                    warn!(task_id, attempt, error = %e, "status check refused");
                    return PollOutcome::Failed {
                        error: e.to_string(),
                    };
                }
                Err(e) => warn!(task_id, attempt, error = %e, "status check failed"),
            }
        }

        warn!(task_id, attempts = self.max_attempts, "gave up waiting for task");
        PollOutcome::TimedOut {
            attempts: self.max_attempts,
        }
    }
}

struct Tracked {
    task_id: String,
    handle: JoinHandle<PollOutcome>,
}

/// Holds at most one running poll.
///
/// Tracking a new task aborts the poll for the previous one, and dropping
/// the slot aborts whatever is still running, so two polls never race to
/// update the same view.
pub struct PollSlot<S: StatusSource> {
    source: Arc<S>,
    poller: Poller,
    current: Option<Tracked>,
}

impl<S: StatusSource> PollSlot<S> {
    pub fn new(source: Arc<S>, poller: Poller) -> Self {
        Self {
            source,
            poller,
            current: None,
        }
    }

    /// Start polling `task_id`, replacing any poll already in this slot.
    pub fn track(&mut self, task_id: impl Into<String>) {
        self.cancel();
        let task_id = task_id.into();
        let source = Arc::clone(&self.source);
        let poller = self.poller;
        let id = task_id.clone();
        let handle = tokio::spawn(async move { poller.poll(source.as_ref(), &id).await });
        self.current = Some(Tracked { task_id, handle });
    }

    /// Task currently being polled, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.task_id.as_str())
    }

    pub fn cancel(&mut self) {
        if let Some(tracked) = self.current.take() {
            if !tracked.handle.is_finished() {
                debug!(task_id = %tracked.task_id, "poll superseded");
            }
            tracked.handle.abort();
        }
    }

    /// Wait for the current poll to finish.  `None` when nothing is tracked.
    pub async fn wait(&mut self) -> Option<PollOutcome> {
        let tracked = self.current.take()?;
        match tracked.handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(task_id = %tracked.task_id, error = %e, "poll task ended abnormally");
                None
            }
        }
    }
}

impl<S: StatusSource> Drop for PollSlot<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Reports `processing` for the first `running_for` checks of each task,
    /// then `completed`.  `errors` replaces the first few answers with API
    /// errors.
    #[derive(Default)]
    struct Scripted {
        running_for: HashMap<String, u32>,
        errors: HashMap<String, Vec<(u16, &'static str)>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl Scripted {
        fn running(mut self, task_id: &str, checks: u32) -> Self {
            self.running_for.insert(task_id.to_owned(), checks);
            self
        }

        fn calls(&self, task_id: &str) -> u32 {
            self.calls.lock().unwrap().get(task_id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn status(&self, task_id: &str) -> Result<StatusResponse, ClientError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(task_id.to_owned()).or_default();
                *n += 1;
                *n
            };
            if let Some(&(status, message)) = self
                .errors
                .get(task_id)
                .and_then(|errors| errors.get((n - 1) as usize))
            {
                return Err(ClientError::Api {
                    status,
                    message: message.to_owned(),
                });
            }
            if n > self.running_for.get(task_id).copied().unwrap_or(0) {
                Ok(StatusResponse::completed(format!("done-{task_id}"), 40))
            } else {
                Ok(StatusResponse::in_progress(TaskStatus::Processing))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_the_last_allowed_check() {
        let source = Scripted::default().running("t", 59);
        let start = Instant::now();

        let outcome = Poller::default().poll(&source, "t").await;

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                result: "done-t".into(),
                points: 40
            }
        );
        assert_eq!(source.calls("t"), 60);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = Scripted::default().running("t", u32::MAX);

        let outcome = Poller::default().poll(&source, "t").await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 60 });
        assert_eq!(source.calls("t"), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_stops_polling() {
        struct AlwaysFailed;

        #[async_trait]
        impl StatusSource for AlwaysFailed {
            async fn status(&self, _task_id: &str) -> Result<StatusResponse, ClientError> {
                Ok(StatusResponse::failed("upstream timed out"))
            }
        }

        let outcome = Poller::default().poll(&AlwaysFailed, "t").await;
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                error: "upstream timed out".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_use_an_attempt_and_continue() {
        let mut source = Scripted::default().running("t", 2);
        source.errors.insert("t".into(), vec![(503, "busy")]);

        let outcome = Poller::default().poll(&source, "t").await;

        // error, processing, completed
        assert!(matches!(outcome, PollOutcome::Completed { .. }));
        assert_eq!(source.calls("t"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_ends_polling() {
        let mut source = Scripted::default().running("t", u32::MAX);
        source.errors.insert("t".into(), vec![(404, "Task not found")]);

        let outcome = Poller::default().poll(&source, "t").await;

        assert!(matches!(outcome, PollOutcome::Failed { ref error } if error.contains("Task not found")));
        assert_eq!(source.calls("t"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_a_new_task_aborts_the_old_poll() {
        let source = Arc::new(Scripted::default().running("a", u32::MAX).running("b", 2));
        let mut slot = PollSlot::new(Arc::clone(&source), Poller::default());

        slot.track("a");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls("a"), 2);

        slot.track("b");
        assert_eq!(slot.task_id(), Some("b"));
        let outcome = slot.wait().await;

        assert_eq!(
            outcome,
            Some(PollOutcome::Completed {
                result: "done-b".into(),
                points: 40
            })
        );
        assert_eq!(source.calls("a"), 2);
        assert_eq!(source.calls("b"), 3);
        assert_eq!(slot.wait().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_slot_stops_polling() {
        let source = Arc::new(Scripted::default().running("a", u32::MAX));
        let mut slot = PollSlot::new(Arc::clone(&source), Poller::default());

        slot.track("a");
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(slot);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(source.calls("a"), 1);
    }
}
