//! Conversions from store rows to the wire types in `jibe-types`.

use jibe_types::{LedgerEntry, StatusResponse, TaskStatus};

use crate::entities::{format_ts, LedgerRecord, TaskRecord};

impl TaskRecord {
    /// One of the four status shapes served by `GET /api/generate/status`.
    pub fn to_status_response(&self) -> StatusResponse {
        match self.status {
            TaskStatus::Completed => StatusResponse::completed(
                self.result.clone().unwrap_or_default(),
                self.remaining_points.unwrap_or_default(),
            )
            .with_completion(self.points_consumed, self.completed_at.map(format_ts)),
            TaskStatus::Failed => StatusResponse::failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| "Task processing failed".to_owned()),
            )
            .with_completion(None, self.completed_at.map(format_ts)),
            status @ (TaskStatus::Pending | TaskStatus::Processing) => {
                StatusResponse::in_progress(status)
            }
        }
    }
}

impl LedgerRecord {
    pub fn to_entry(&self) -> LedgerEntry {
        LedgerEntry {
            id: self.id.clone(),
            amount: self.amount,
            reason: self.reason.clone(),
            task_id: self.task_id.clone(),
            created_at: format_ts(self.created_at),
        }
    }
}
