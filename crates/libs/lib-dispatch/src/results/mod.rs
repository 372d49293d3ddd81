//! # Result Channel
//!
//! Fire-and-forget publish/subscribe for [`ResultEvent`]s. The worker publishes one
//! event per finished task; every gateway instance subscribes and forwards the
//! events whose task it owns. Delivery is at most once: an event published while
//! nobody listens is gone.
//!
//! - [`BroadcastResultChannel`] - in-process, over `tokio::sync::broadcast`
//! - [`RedisResultChannel`](redis::RedisResultChannel) - Redis Pub/Sub (feature `redis`)

pub mod broadcast;

#[cfg(feature = "redis")]
pub mod redis;

pub use broadcast::BroadcastResultChannel;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lib_core::Result;
use shared::dto::ResultEvent;

/// Events in publish order. Ends when the underlying subscription is lost.
pub type ResultStream = BoxStream<'static, ResultEvent>;

#[async_trait]
pub trait ResultChannel: Send + Sync {
    /// Publish `event` to current subscribers. Returns how many received it.
    async fn publish(&self, event: &ResultEvent) -> Result<usize>;

    /// Start receiving events published from now on.
    async fn subscribe(&self) -> Result<ResultStream>;
}
