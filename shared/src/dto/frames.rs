//! # Client Frames
//!
//! One JSON object per WebSocket text frame in each direction.

use serde::{Deserialize, Serialize};

/// Inbound frame sent by the browser.
///
/// `chatId` absent (or empty) starts a new chat. `text` is optional on the wire so
/// that a missing field is reported as an empty message rather than a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ClientFrame {
    /// Chat id with the empty string treated as absent.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// Outbound frame pushed to the browser, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A chat was created for a message submitted without `chatId`.
    #[serde(rename_all = "camelCase")]
    ChatCreated {
        chat_id: String,
        chat_name: String,
        session_id: String,
        task_id: String,
    },
    /// The user message was persisted and its task enqueued.
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        message_id: String,
        chat_id: String,
        task_id: String,
    },
    /// The responder's reply for a task.
    #[serde(rename_all = "camelCase")]
    AiMessage { text: String, task_id: String },
    /// Validation or processing failure.
    #[serde(rename_all = "camelCase")]
    Error {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
}

impl ServerFrame {
    pub fn ai_message(text: impl Into<String>, task_id: impl Into<String>) -> Self {
        ServerFrame::AiMessage {
            text: text.into(),
            task_id: task_id.into(),
        }
    }

    pub fn error(text: impl Into<String>, task_id: Option<String>) -> Self {
        ServerFrame::Error {
            text: text.into(),
            task_id,
        }
    }

    /// Task id the frame is correlated with, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ServerFrame::ChatCreated { task_id, .. }
            | ServerFrame::MessageReceived { task_id, .. }
            | ServerFrame::AiMessage { task_id, .. } => Some(task_id),
            ServerFrame::Error { task_id, .. } => task_id.as_deref(),
        }
    }

    /// Frame kind as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::ChatCreated { .. } => "chat_created",
            ServerFrame::MessageReceived { .. } => "message_received",
            ServerFrame::AiMessage { .. } => "ai_message",
            ServerFrame::Error { .. } => "error",
        }
    }
}
