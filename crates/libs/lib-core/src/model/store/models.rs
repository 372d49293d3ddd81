use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Chat record. The relay reads and bumps the message counter and honours
/// `is_over`, but does not own the chat's lifecycle.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub session_id: String,
    pub user_messages_count: i64,
    pub is_over: bool,
    pub created_at: DateTime<Utc>,
}

/// Data structure for creating a new chat.
#[derive(Debug, Clone)]
pub struct ChatForCreate {
    pub user_id: String,
    pub name: String,
    pub session_id: String,
}

impl ChatForCreate {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            session_id: session_id.into(),
        }
    }
}

/// A message in a chat. AI replies have `is_user_message = false` and no user id.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub is_user_message: bool,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
