//! # Web Library
//!
//! The relay's network edge: WebSocket gateway, HTTP handlers, middleware, and
//! server assembly.
//!
//! - **[`gateway`]**: frame intake, connection registry, and result fan-out
//! - **[`handlers`]**: `/ws` upgrade and `/health`
//! - **[`middleware`]**: request stamping and logging
//! - **[`server`]**: wires storage, queue, worker and router together

pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use gateway::{ConnectionHandle, ConnectionRegistry, Gateway};
pub use server::{create_router, start_server, AppState, ServerConfig};
