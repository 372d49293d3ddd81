//! # Shared Data Transfer Objects Library
//!
//! This library defines the wire contract of the chat relay: the frames exchanged
//! with browser clients over the WebSocket, and the records handed from the gateway
//! to the worker (queue tasks) and back (result events).
//!
//! ## Structure
//!
//! - **[`dto`]**: Data Transfer Objects
//!   - **[`dto::frames`]**: inbound client frame and the tagged outbound frame union
//!   - **[`dto::dispatch`]**: queued task and result event records
//! - **[`utils`]**: Shared helpers
//!   - **[`utils::derive_chat_name`]**: name a new chat from its first message
//!
//! ## Wire Format
//!
//! Field names are **camelCase** on the wire, matching the browser client. Outbound
//! frames are discriminated by a `type` field:
//!
//! ```text
//! {"type":"chat_created","chatId":"..","chatName":"..","sessionId":"..","taskId":".."}
//! {"type":"message_received","messageId":"..","chatId":"..","taskId":".."}
//! {"type":"ai_message","text":"..","taskId":".."}
//! {"type":"error","text":"..","taskId":".."}
//! ```
//!
//! ## Usage in Backend
//!
//! ```rust
//! use shared::dto::frames::{ClientFrame, ServerFrame};
//!
//! let frame: ClientFrame = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
//! assert!(frame.chat_id.is_none());
//!
//! let reply = ServerFrame::ai_message("hi there", "task-1");
//! assert!(serde_json::to_string(&reply).unwrap().contains(r#""type":"ai_message""#));
//! ```

pub mod dto;
pub mod utils;

pub use dto::*;
pub use utils::*;
