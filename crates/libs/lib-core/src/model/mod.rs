//! # Model Layer
//!
//! Persistence for the entities the relay references: chats and messages, plus the
//! schema of the durable task log.

pub mod store;
