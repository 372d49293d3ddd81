//! In-process result channel.
//!
//! Gateway and worker share one process, so a `tokio::sync::broadcast` channel is
//! all the fan-out needs. A subscriber that falls more than `capacity` events behind
//! skips the events it missed and keeps going.

use async_trait::async_trait;
use futures_util::StreamExt;
use lib_core::Result;
use shared::dto::ResultEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::{ResultChannel, ResultStream};

const DEFAULT_CAPACITY: usize = 1024;

/// Result channel backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastResultChannel {
    name: String,
    tx: broadcast::Sender<ResultEvent>,
}

impl BroadcastResultChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    /// `capacity` is the per-subscriber backlog; zero is raised to one.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { name: name.into(), tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ResultChannel for BroadcastResultChannel {
    async fn publish(&self, event: &ResultEvent) -> Result<usize> {
        // No receivers is not an error: the event is simply dropped.
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(
            "[RESULTS] Published result for task {} on {} to {} subscriber(s)",
            event.task_id,
            self.name,
            receivers
        );
        Ok(receivers)
    }

    async fn subscribe(&self) -> Result<ResultStream> {
        let name = self.name.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let event = match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("[RESULTS] Subscriber on {} lagged, skipped {} result(s)", name, skipped);
                    None
                }
            };
            futures_util::future::ready(event)
        });

        Ok(stream.boxed())
    }
}
