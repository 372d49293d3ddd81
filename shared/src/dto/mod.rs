//! # Data Transfer Objects (DTOs)
//!
//! ## Module Organization
//!
//! - [`frames`] - JSON frames exchanged with WebSocket clients
//! - [`dispatch`] - Task queue entries and result events shared by gateway and worker
//!
//! ## Serialization Format
//!
//! - **Field naming**: camelCase (`#[serde(rename_all = "camelCase")]`)
//! - **Optional fields**: Omitted when `None`
//! - **Frame kinds**: internally tagged by `type`, snake_case values

pub mod dispatch;
pub mod frames;

pub use dispatch::*;
pub use frames::*;
