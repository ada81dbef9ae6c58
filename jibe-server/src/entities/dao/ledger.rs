use chrono::{DateTime, Utc};

/// A row in the append-only `point_transactions` table.
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    pub id: String,
    /// Signed balance change; debits are negative.
    pub amount: i64,
    /// `"generation"`, `"grant"`, ...
    pub reason: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
