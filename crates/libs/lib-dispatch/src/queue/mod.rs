//! # Task Queue
//!
//! A durable, append-only, totally ordered log of entries consumed through named
//! consumer groups.
//!
//! - [`TaskQueue::append`] adds an entry and returns its generated id.
//! - [`TaskQueue::claim`] hands the calling consumer the next entry of its group,
//!   blocking up to a bounded wait. The entry stays *pending* (owned by that
//!   consumer) until acknowledged.
//! - [`TaskQueue::ack`] retires a pending entry for good.
//! - Entries left pending longer than the queue's reclaim threshold (a consumer
//!   crashed between claim and ack) are handed out again by `claim` before any new
//!   entry, so every entry is delivered at least once.
//!
//! Implementations:
//!
//! - [`SqliteTaskQueue`] - the log lives in the application database
//! - [`RedisTaskQueue`](redis::RedisTaskQueue) - Redis Streams (feature `redis`)

pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis;

pub use sqlite::SqliteTaskQueue;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lib_core::{AppError, Result};
use shared::dto::Task;

/// Id of a log entry, generated by the queue on append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields stored in one entry: the serialized task and its delegated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub task: String,
    pub jwt: String,
}

impl QueueEntry {
    pub const TASK_FIELD: &'static str = "task";
    pub const JWT_FIELD: &'static str = "jwt";

    pub fn new(task: &Task, jwt: impl Into<String>) -> Result<Self> {
        let task = serde_json::to_string(task).map_err(|e| AppError::Encoding(format!("task: {}", e)))?;
        Ok(Self { task, jwt: jwt.into() })
    }

    pub fn decode_task(&self) -> Result<Task> {
        Ok(serde_json::from_str(&self.task)?)
    }

    /// `taskId` of a task payload that does not decode as a whole.
    pub fn recover_task_id(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.task).ok()?;
        value
            .get("taskId")
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// An entry handed to a consumer, pending until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub id: EntryId,
    pub entry: QueueEntry,
    /// 1 on first delivery, higher on redelivery.
    pub delivery_count: u32,
}

/// A delivered-but-unacknowledged entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: EntryId,
    pub consumer: String,
    pub idle: Duration,
    pub delivery_count: u32,
}

/// Durable task log with group-based, acknowledgeable consumption.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Create consumer group `group` if absent. Existing groups are left untouched.
    async fn ensure_group(&self, group: &str) -> Result<()>;

    /// Append an entry to the end of the log.
    async fn append(&self, entry: &QueueEntry) -> Result<EntryId>;

    /// Claim the next entry for `consumer` in `group`, waiting up to `block`.
    ///
    /// `Ok(None)` means the wait elapsed with nothing to deliver.
    async fn claim(&self, group: &str, consumer: &str, block: Duration) -> Result<Option<ClaimedEntry>>;

    /// Acknowledge a pending entry. Returns `false` if it was not pending.
    async fn ack(&self, group: &str, id: &EntryId) -> Result<bool>;

    /// Entries of `group` delivered but not yet acknowledged, oldest first.
    async fn pending(&self, group: &str) -> Result<Vec<PendingEntry>>;
}
