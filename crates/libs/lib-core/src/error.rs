//! # Centralized Error Handling
//!
//! This module defines the application-wide error type [`AppError`] used consistently
//! across the gateway, the queue, and the worker. It follows the `thiserror` pattern
//! for ergonomic error handling.
//!
//! ## Error Categories
//!
//! 1. **Handshake faults** - credential missing, expired or forged
//!    - [`Unauthorized`](AppError::Unauthorized) → 401
//!
//! 2. **Request-validation faults** - answered with an `error` frame, never enqueued
//!    - [`InvalidInput`](AppError::InvalidInput) → 400
//!    - [`NotFound`](AppError::NotFound) → 404
//!    - [`ChatClosed`](AppError::ChatClosed) → 409
//!
//! 3. **Task-processing faults** - surfaced through a failure result event
//!    - [`Responder`](AppError::Responder) → 502
//!    - [`Timeout`](AppError::Timeout) → 504
//!
//! 4. **Infrastructure faults** - logged and retried by the worker loop
//!    - [`Queue`](AppError::Queue) → 503
//!    - [`Database`](AppError::Database) → 500
//!
//! 5. **Everything else**
//!    - [`Config`](AppError::Config), [`Encoding`](AppError::Encoding),
//!      [`Decoding`](AppError::Decoding), [`Internal`](AppError::Internal) → 500
//!
//! ## Usage Example
//!
//! ```rust
//! use lib_core::error::{AppError, Result};
//!
//! fn require_text(text: &str) -> Result<&str> {
//!     if text.trim().is_empty() {
//!         return Err(AppError::InvalidInput("Сообщение не может быть пустым".to_string()));
//!     }
//!     Ok(text)
//! }
//! ```
//!
//! ## Error Conversion
//!
//! - `From<anyhow::Error>` - Convert anyhow errors to AppError
//! - `From<sqlx::Error>` - Convert database errors to AppError
//! - `From<serde_json::Error>` - Convert JSON errors to AppError

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for `Result<T, AppError>`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Generic text shown to clients for internal failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Application-wide error type covering all error scenarios.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error during startup or environment loading.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential missing, expired, or invalid.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested resource not found (or not visible to this user).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input validation error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The chat reached its terminal state and accepts no new messages.
    #[error("Chat closed: {0}")]
    ChatClosed(String),

    /// Chat/message store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Task queue or result channel unreachable or misbehaving.
    #[error("Queue error: {0}")]
    Queue(String),

    /// AI responder returned a non-success status or an unusable body.
    #[error("Responder error: {0}")]
    Responder(String),

    /// An external call exceeded its time bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Data encoding error (JSON serialization, token signing).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Data decoding error (JSON deserialization).
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Internal server error (unexpected failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ChatClosed(_) => StatusCode::CONFLICT,
            AppError::Responder(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_)
            | AppError::Database(_)
            | AppError::Encoding(_)
            | AppError::Decoding(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message.
    ///
    /// For internal errors, returns a generic message to avoid exposing implementation details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::ChatClosed(msg)
            | AppError::Responder(msg)
            | AppError::Timeout(msg) => msg.clone(),
            AppError::Queue(_) => "Service temporarily unavailable".to_string(),
            AppError::Config(_)
            | AppError::Database(_)
            | AppError::Encoding(_)
            | AppError::Decoding(_)
            | AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Queue/database faults: nothing is wrong with the task itself and the
    /// operation may succeed if retried later.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::Queue(_) | AppError::Database(_))
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Config",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::ChatClosed(_) => "ChatClosed",
            AppError::Database(_) => "Database",
            AppError::Queue(_) => "Queue",
            AppError::Responder(_) => "Responder",
            AppError::Timeout(_) => "Timeout",
            AppError::Encoding(_) => "Encoding",
            AppError::Decoding(_) => "Decoding",
            AppError::Internal(_) => "Internal",
        }
    }
}

/// Implement Axum's `IntoResponse` for automatic error handling.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.user_message();

        if status.is_server_error() {
            tracing::error!("Server error: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert `sqlx::Error` to `AppError`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Database record not found".to_string()),
            sqlx::Error::Database(db_err) => AppError::Database(db_err.message().to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

/// Convert `serde_json::Error` to `AppError`.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decoding(format!("JSON error: {}", err))
    }
}
