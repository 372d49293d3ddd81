//! # Dispatch Library
//!
//! Everything between "a message was accepted" and "its answer is ready":
//!
//! - **[`queue`]**: durable task log with consumer groups
//! - **[`results`]**: publish/subscribe channel for task outcomes
//! - **[`responder`]**: the AI responder webhook client
//! - **[`worker`]**: the claim → respond → publish → ack loop
//! - **[`transport`]**: picks the queue/result backends from configuration

pub mod queue;
pub mod responder;
pub mod results;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use queue::{ClaimedEntry, EntryId, PendingEntry, QueueEntry, SqliteTaskQueue, TaskQueue};
pub use responder::{Responder, ResponderRequest, WebhookResponder};
pub use results::{BroadcastResultChannel, ResultChannel, ResultStream};
pub use transport::{connect_transport, Transport};
pub use worker::{StepOutcome, Worker, WorkerConfig};
