//! # Chat Repository
//!
//! Provides database access for chats and their messages.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use lib_core::model::store::{create_pool, migrate, ChatRepository, ChatForCreate};
//! # async fn example() -> anyhow::Result<()> {
//! let pool = create_pool("sqlite::memory:").await?;
//! migrate(&pool).await?;
//!
//! let chat = ChatRepository::create(&pool, &ChatForCreate::new("user-1", "hello", "session-1")).await?;
//! let found = ChatRepository::find_for_user(&pool, &chat.id, "user-1").await?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

use super::models::{Chat, ChatForCreate, ChatMessage};
use super::DbPool;
use chrono::Utc;
use sqlx::query_as;
use uuid::Uuid;

/// Chat repository for database operations.
pub struct ChatRepository;

impl ChatRepository {
    /// Create a chat owned by `data.user_id` with a zero message counter.
    pub async fn create(pool: &DbPool, data: &ChatForCreate) -> Result<Chat, sqlx::Error> {
        query_as::<_, Chat>(
            r#"
            INSERT INTO chats (id, user_id, name, session_id, user_messages_count, is_over, created_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&data.user_id)
        .bind(&data.name)
        .bind(&data.session_id)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Find a chat by id, only if it belongs to `user_id`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Chat))` - Chat exists and is owned by the user
    /// * `Ok(None)` - No such chat, or it belongs to someone else
    pub async fn find_for_user(pool: &DbPool, chat_id: &str, user_id: &str) -> Result<Option<Chat>, sqlx::Error> {
        query_as::<_, Chat>("SELECT * FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a chat by id regardless of owner.
    pub async fn find_by_id(pool: &DbPool, chat_id: &str) -> Result<Option<Chat>, sqlx::Error> {
        query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically bump the user-message counter.
    pub async fn increment_message_count(pool: &DbPool, chat_id: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE chats SET user_messages_count = user_messages_count + 1 WHERE id = ?")
            .bind(chat_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    /// Move a chat to its terminal state.
    pub async fn close(pool: &DbPool, chat_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chats SET is_over = 1 WHERE id = ?")
            .bind(chat_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a message. `user_id` is `None` for responder replies.
    pub async fn create_message(
        pool: &DbPool,
        chat_id: &str,
        text: &str,
        is_user_message: bool,
        user_id: Option<&str>,
    ) -> Result<ChatMessage, sqlx::Error> {
        query_as::<_, ChatMessage>(
            r#"
            INSERT INTO messages (id, chat_id, text, is_user_message, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chat_id)
        .bind(text)
        .bind(is_user_message)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Load all messages of a chat, oldest first.
    pub async fn list_messages(pool: &DbPool, chat_id: &str) -> Result<Vec<ChatMessage>, sqlx::Error> {
        query_as::<_, ChatMessage>("SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC")
            .bind(chat_id)
            .fetch_all(pool)
            .await
    }
}
