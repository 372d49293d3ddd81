//! # Dispatch Records
//!
//! Records that travel between the gateway and the worker: the [`Task`] serialized
//! into every queue entry, and the [`ResultEvent`] published when a task reaches a
//! terminal outcome.
//!
//! ```text
//! queue entry   { task: "<Task JSON>", jwt: "<delegated token>" }
//! result event  {"taskId":"..","type":"message_processed","success":true,"aiResponse":".."}
//! ```

use serde::{Deserialize, Serialize};

use super::frames::ServerFrame;

/// Text sent to the client when a failed result carries no error message.
pub const DEFAULT_FAILURE_TEXT: &str = "Не удалось обработать сообщение";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskKind {
    #[default]
    #[serde(rename = "process_message")]
    ProcessMessage,
}

/// One user message's unit of asynchronous work. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Correlation key for the whole round trip.
    pub task_id: String,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    pub user_id: String,
    pub chat_id: String,
    pub session_id: String,
    pub message_text: String,
    /// Connection that submitted the task.
    #[serde(rename = "socketId", default, skip_serializing_if = "Option::is_none")]
    pub origin_connection_id: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResultKind {
    #[default]
    #[serde(rename = "message_processed")]
    MessageProcessed,
}

/// One-shot notification that a task finished. Published once, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    pub task_id: String,
    #[serde(rename = "type", default)]
    pub kind: ResultKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEvent {
    pub fn success(task_id: impl Into<String>, ai_response: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: ResultKind::MessageProcessed,
            success: true,
            ai_response: Some(ai_response.into()),
            error: None,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: ResultKind::MessageProcessed,
            success: false,
            ai_response: None,
            error: Some(error.into()),
        }
    }

    /// Client frame carrying this outcome, tagged with the task id.
    pub fn into_frame(self) -> ServerFrame {
        if self.success {
            ServerFrame::AiMessage {
                text: self.ai_response.unwrap_or_default(),
                task_id: self.task_id,
            }
        } else {
            ServerFrame::Error {
                text: self
                    .error
                    .unwrap_or_else(|| DEFAULT_FAILURE_TEXT.to_string()),
                task_id: Some(self.task_id),
            }
        }
    }
}
