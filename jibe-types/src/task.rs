//! Generation request / task status types.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of the conversation history.
///
/// Only `role` and `content` are kept; any other field a browser sends along
/// is dropped during deserialization and never reaches the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Lifecycle state of a generation task.
///
/// `Pending` is accepted when reading older rows but new tasks start in
/// `Processing`.  `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GenerateRequest {
    /// Full conversation, oldest first, ending with the current user turn.
    pub messages: Vec<ChatMessage>,
}

/// Response body for an accepted `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct GenerateAccepted {
    pub task_id: String,
    pub message: String,
    pub success: bool,
}

impl GenerateAccepted {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: "Task accepted, poll the status endpoint for the result".to_owned(),
            success: true,
        }
    }
}

/// Response body for `GET /api/generate/status`.
///
/// The shape depends on `status`: completed answers carry `result` and
/// `points` (the remaining balance), failed answers carry `error` with
/// `success: false`, and in-progress answers carry a `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_consumed: Option<i64>,
    /// RFC 3339 timestamp of the terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
}

impl StatusResponse {
    pub fn completed(result: impl Into<String>, remaining_points: i64) -> Self {
        Self {
            status: TaskStatus::Completed,
            result: Some(result.into()),
            points: Some(remaining_points),
            points_consumed: None,
            completed_at: None,
            error: None,
            message: None,
            success: true,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            points: None,
            points_consumed: None,
            completed_at: None,
            error: Some(error.into()),
            message: None,
            success: false,
        }
    }

    pub fn with_completion(mut self, points_consumed: Option<i64>, completed_at: Option<String>) -> Self {
        self.points_consumed = points_consumed;
        self.completed_at = completed_at;
        self
    }

    /// Shape for a task that has not reached a terminal state yet.
    pub fn in_progress(status: TaskStatus) -> Self {
        let message = match status {
            TaskStatus::Pending => "Task is waiting to be processed",
            _ => "Task is being processed",
        };
        Self {
            status,
            result: None,
            points: None,
            points_consumed: None,
            completed_at: None,
            error: None,
            message: Some(message.to_owned()),
            success: true,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub success: bool,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_message_fields_are_dropped() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": "hello",
            "id": 17,
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg, ChatMessage::user("hello"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "role": "user", "content": "hello" })
        );
    }

    #[test]
    fn unknown_role_is_rejected() {
        let res = serde_json::from_value::<ChatMessage>(json!({ "role": "tool", "content": "x" }));
        assert!(res.is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert_eq!("processing".parse::<TaskStatus>().unwrap(), TaskStatus::Processing);
        assert_eq!(TaskStatus::Failed.as_ref(), "failed");
    }

    #[test]
    fn status_shapes() {
        assert_eq!(
            serde_json::to_value(StatusResponse::completed("hi there", 40)).unwrap(),
            json!({ "status": "completed", "result": "hi there", "points": 40, "success": true })
        );
        assert_eq!(
            serde_json::to_value(StatusResponse::failed("boom")).unwrap(),
            json!({ "status": "failed", "error": "boom", "success": false })
        );
        let done = StatusResponse::completed("hi", 30)
            .with_completion(Some(10), Some("2026-01-01T00:00:00Z".into()));
        let done = serde_json::to_value(done).unwrap();
        assert_eq!(done["pointsConsumed"], 10);
        assert_eq!(done["completedAt"], "2026-01-01T00:00:00Z");
        let pending = serde_json::to_value(StatusResponse::in_progress(TaskStatus::Pending)).unwrap();
        assert_eq!(pending["status"], "pending");
        assert_eq!(pending["success"], true);
        assert!(pending["message"].is_string());
        assert!(pending.get("result").is_none());
    }

    #[test]
    fn accepted_uses_camel_case() {
        let body = serde_json::to_value(GenerateAccepted::new("abc")).unwrap();
        assert_eq!(body["taskId"], "abc");
        assert_eq!(body["success"], true);
    }
}
