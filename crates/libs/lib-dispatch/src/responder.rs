//! # AI Responder
//!
//! The AI responder is an opaque webhook: it receives the user's message with its
//! chat/session/task identifiers and answers with `{"output": "<reply text>"}`.
//! It is called with the task's delegated token as bearer credential and the task
//! id in `X-Task-ID`.
//!
//! Any non-2xx status or a body without a string `output` is a task failure,
//! reported as [`AppError::Responder`]. Latency is bounded by the worker, not here.

use async_trait::async_trait;
use lib_core::{AppError, Result};
use reqwest::Client;
use serde::Serialize;
use shared::dto::Task;

pub const TASK_ID_HEADER: &str = "X-Task-ID";

/// Body posted to the responder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRequest {
    pub message: String,
    pub chat_id: String,
    pub user_id: String,
    pub session_id: String,
    pub task_id: String,
}

impl From<&Task> for ResponderRequest {
    fn from(task: &Task) -> Self {
        Self {
            message: task.message_text.clone(),
            chat_id: task.chat_id.clone(),
            user_id: task.user_id.clone(),
            session_id: task.session_id.clone(),
            task_id: task.task_id.clone(),
        }
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    /// Ask for a reply to `request`, authenticating with `bearer`.
    async fn respond(&self, request: &ResponderRequest, bearer: &str) -> Result<String>;
}

/// HTTP webhook responder.
#[derive(Clone)]
pub struct WebhookResponder {
    http: Client,
    url: String,
}

impl WebhookResponder {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Responder for WebhookResponder {
    async fn respond(&self, request: &ResponderRequest, bearer: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(bearer)
            .header(TASK_ID_HEADER, &request.task_id)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Responder(format!("AI responder unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Responder(format!("AI responder request failed: {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Responder(format!("AI responder returned malformed body: {}", e)))?;

        match body.get("output").and_then(|output| output.as_str()) {
            Some(output) => Ok(output.to_string()),
            None => Err(AppError::Responder(
                "AI responder returned no output".to_string(),
            )),
        }
    }
}
