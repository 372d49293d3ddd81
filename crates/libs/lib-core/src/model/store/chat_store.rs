//! # Chat Store Seam
//!
//! The gateway and the worker talk to chats and messages only through [`ChatStore`],
//! so the record store can be swapped (or faked in tests) without touching the
//! dispatch pipeline. [`SqliteChatStore`] is the implementation the server runs with.

use async_trait::async_trait;

use super::models::{Chat, ChatForCreate, ChatMessage};
use super::{ChatRepository, DbPool};
use crate::error::Result;

/// Store collaborator for chats and messages, keyed by opaque string ids.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, user_id: &str, name: &str, session_id: &str) -> Result<Chat>;

    /// Chat `chat_id` if it exists and belongs to `user_id`.
    async fn find_chat(&self, chat_id: &str, user_id: &str) -> Result<Option<Chat>>;

    async fn increment_message_count(&self, chat_id: &str) -> Result<()>;

    async fn create_message(
        &self,
        chat_id: &str,
        text: &str,
        is_user_message: bool,
        user_id: Option<&str>,
    ) -> Result<ChatMessage>;
}

/// [`ChatStore`] backed by the application's SQLite database.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: DbPool,
}

impl SqliteChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn create_chat(&self, user_id: &str, name: &str, session_id: &str) -> Result<Chat> {
        let chat = ChatRepository::create(&self.pool, &ChatForCreate::new(user_id, name, session_id)).await?;
        Ok(chat)
    }

    async fn find_chat(&self, chat_id: &str, user_id: &str) -> Result<Option<Chat>> {
        Ok(ChatRepository::find_for_user(&self.pool, chat_id, user_id).await?)
    }

    async fn increment_message_count(&self, chat_id: &str) -> Result<()> {
        Ok(ChatRepository::increment_message_count(&self.pool, chat_id).await?)
    }

    async fn create_message(
        &self,
        chat_id: &str,
        text: &str,
        is_user_message: bool,
        user_id: Option<&str>,
    ) -> Result<ChatMessage> {
        Ok(ChatRepository::create_message(&self.pool, chat_id, text, is_user_message, user_id).await?)
    }
}
