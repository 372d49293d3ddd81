//! # Core Library
//!
//! Core models, database, configuration, and error type for the relay.

pub mod config;
pub mod error;
pub mod model;

// Re-export commonly used types
pub use config::{Config, QueueBackend};
pub use error::{AppError, Result};
pub use model::store::{create_pool, migrate, ChatStore, DbPool, SqliteChatStore};
