//! # Gateway
//!
//! Brokers chat messages between live connections and the task queue without ever
//! waiting on the AI responder.
//!
//! ## Per inbound frame
//!
//! 1. Generate a task id.
//! 2. No `chatId`: create a chat named after the message and push `chat_created`.
//!    With `chatId`: load it for this user; unknown/foreign or closed chats are
//!    answered with an `error` frame.
//! 3. Reject empty (or oversized) text. A chat created in step 2 is kept.
//! 4. Store the user's message and bump the chat's message counter.
//! 5. Mint a delegated token for the task.
//! 6. Bind the task id to this connection and push `message_received`.
//! 7. Append the task to the queue.
//!
//! Every rejection is an `error` frame tagged with the task id; nothing is enqueued.
//! The result comes back later through [`fanout`].
//!
//! ## Modules
//!
//! - [`registry`] - connection and task-id index
//! - [`handshake`] - token extraction and authentication for the upgrade request
//! - [`fanout`] - routes result events to connections

pub mod fanout;
pub mod handshake;
pub mod registry;

#[cfg(test)]
mod tests;

pub use fanout::{deliver, spawn_result_fanout};
pub use handshake::{authenticate, extract_token};
pub use registry::{ConnectionHandle, ConnectionRegistry};

use std::sync::Arc;

use lib_auth::{DelegatedTokenMinter, TaskScope};
use lib_core::{AppError, ChatStore, Result};
use lib_dispatch::{QueueEntry, TaskQueue};
use lib_utils::{format_time, now_utc, validate_max_chars, validate_not_empty};
use shared::dto::{ClientFrame, ServerFrame, Task, TaskKind};
use shared::utils::derive_chat_name;
use uuid::Uuid;

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 50_000;

pub const CHAT_NOT_FOUND: &str = "Чат не найден или у вас нет доступа";
pub const CHAT_CLOSED: &str = "Этот чат завершен. Создайте новый.";
pub const EMPTY_MESSAGE: &str = "Сообщение не может быть пустым";
pub const MESSAGE_TOO_LONG: &str = "Сообщение слишком длинное";
pub const MALFORMED_FRAME: &str = "Некорректный формат сообщения";

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn ChatStore>,
    queue: Arc<dyn TaskQueue>,
    minter: DelegatedTokenMinter,
    registry: ConnectionRegistry,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn ChatStore>,
        queue: Arc<dyn TaskQueue>,
        minter: DelegatedTokenMinter,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            queue,
            minter,
            registry,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle one inbound frame from `conn`. All replies are pushed onto `conn`.
    pub async fn handle_frame(&self, conn: &ConnectionHandle, raw: &[u8]) {
        let task_id = Uuid::new_v4().to_string();

        let frame: ClientFrame = match serde_json::from_slice(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[GATEWAY] Malformed frame on connection {}: {}", conn.id(), e);
                conn.send(ServerFrame::error(MALFORMED_FRAME, Some(task_id)));
                return;
            }
        };

        if let Err(e) = self.accept(conn, &task_id, &frame).await {
            match &e {
                AppError::NotFound(_) | AppError::ChatClosed(_) | AppError::InvalidInput(_) => {
                    tracing::info!("[GATEWAY] Task {} rejected: {}", task_id, e);
                }
                _ => tracing::error!("[GATEWAY] Task {} failed: {}", task_id, e),
            }
            conn.send(ServerFrame::error(e.user_message(), Some(task_id)));
        }
    }

    async fn accept(&self, conn: &ConnectionHandle, task_id: &str, frame: &ClientFrame) -> Result<()> {
        let user_id = conn.user_id();
        let text = frame.text();

        let (chat_id, session_id) = match frame.chat_id() {
            None => {
                let session_id = Uuid::new_v4().to_string();
                let chat = self
                    .store
                    .create_chat(user_id, &derive_chat_name(text), &session_id)
                    .await?;
                tracing::info!("[GATEWAY] Created chat {} for user {}", chat.id, user_id);

                conn.send(ServerFrame::ChatCreated {
                    chat_id: chat.id.clone(),
                    chat_name: chat.name,
                    session_id: chat.session_id.clone(),
                    task_id: task_id.to_string(),
                });

                // The chat stays, even when its first message is rejected below.
                validate_text(text)?;
                (chat.id, chat.session_id)
            }
            Some(chat_id) => {
                let chat = self
                    .store
                    .find_chat(chat_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(CHAT_NOT_FOUND.to_string()))?;

                if chat.is_over {
                    return Err(AppError::ChatClosed(CHAT_CLOSED.to_string()));
                }
                validate_text(text)?;
                (chat.id, chat.session_id)
            }
        };

        let message = self.store.create_message(&chat_id, text, true, Some(user_id)).await?;
        self.store.increment_message_count(&chat_id).await?;

        let jwt = self
            .minter
            .mint(&TaskScope {
                user_id: user_id.to_string(),
                chat_id: chat_id.clone(),
                session_id: session_id.clone(),
                task_id: task_id.to_string(),
            })
            .map_err(|e| AppError::Encoding(format!("delegated token: {}", e)))?;

        let task = Task {
            task_id: task_id.to_string(),
            kind: TaskKind::ProcessMessage,
            user_id: user_id.to_string(),
            chat_id: chat_id.clone(),
            session_id,
            message_text: text.to_string(),
            origin_connection_id: Some(conn.id().to_string()),
            created_at: format_time(now_utc()),
        };
        let entry = QueueEntry::new(&task, jwt)?;

        // Bind and acknowledge before appending: once appended, the result may
        // arrive at any moment and must find the connection, after the ack.
        self.registry.bind_task(task_id, conn.id()).await;
        conn.send(ServerFrame::MessageReceived {
            message_id: message.id,
            chat_id: chat_id.clone(),
            task_id: task_id.to_string(),
        });

        match self.queue.append(&entry).await {
            Ok(entry_id) => {
                tracing::info!(
                    "[GATEWAY] Task {} enqueued as entry {} (chat {})",
                    task_id,
                    entry_id,
                    chat_id
                );
                Ok(())
            }
            Err(e) => {
                self.registry.release_task(task_id).await;
                Err(e)
            }
        }
    }
}

fn validate_text(text: &str) -> Result<()> {
    validate_not_empty(text, "text").map_err(|_| AppError::InvalidInput(EMPTY_MESSAGE.to_string()))?;
    validate_max_chars(text, MAX_MESSAGE_CHARS, "text")
        .map_err(|_| AppError::InvalidInput(MESSAGE_TOO_LONG.to_string()))
}
