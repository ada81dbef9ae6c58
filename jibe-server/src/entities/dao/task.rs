use chrono::{DateTime, Utc};
use jibe_types::{ChatMessage, TaskStatus};

/// A row in the `generation_tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub status: TaskStatus,
    /// Conversation as submitted, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Set only once `status` is `completed`.
    pub result: Option<String>,
    /// Set only once `status` is `failed`.
    pub error: Option<String>,
    pub points_consumed: Option<i64>,
    pub remaining_points: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Set on any terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of the single-transaction "debit, record, finalize" step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Points debited, ledger entry written, task marked completed.
    Charged { remaining: i64 },
    /// Balance dropped below the cost since submission; nothing changed.
    InsufficientFunds,
    /// The task had already reached a terminal state; nothing changed.
    AlreadyFinal,
}
