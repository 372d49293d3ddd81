//! # HTTP Request Handlers
//!
//! ## Handler Modules
//!
//! - **[`websocket`]**: the chat socket
//!   - `GET /ws?token=<access token>` - authenticated WebSocket upgrade
//!
//! - **[`health`]**: liveness probe
//!   - `GET /health` - returns `OK`

pub mod health;
pub mod websocket;

#[cfg(test)]
mod tests;
