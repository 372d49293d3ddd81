//! Redis Pub/Sub result channel, for gateways and workers in separate processes.
//!
//! Events travel as their JSON encoding. Undecodable messages are logged and skipped.

use async_trait::async_trait;
use futures_util::StreamExt;
use lib_core::{AppError, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use shared::dto::ResultEvent;

use super::{ResultChannel, ResultStream};

pub struct RedisResultChannel {
    client: redis::Client,
    publisher: ConnectionManager,
    channel: String,
}

impl RedisResultChannel {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(queue_err)?;
        let publisher = ConnectionManager::new(client.clone()).await.map_err(queue_err)?;

        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl ResultChannel for RedisResultChannel {
    async fn publish(&self, event: &ResultEvent) -> Result<usize> {
        let payload = serde_json::to_string(event).map_err(|e| AppError::Encoding(e.to_string()))?;
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(&self.channel, payload).await.map_err(queue_err)?;
        Ok(receivers)
    }

    async fn subscribe(&self) -> Result<ResultStream> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(queue_err)?;
        pubsub.subscribe(&self.channel).await.map_err(queue_err)?;
        tracing::info!("[RESULTS] Subscribed to {}", self.channel);

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let event = msg
                .get_payload::<String>()
                .map_err(|e| e.to_string())
                .and_then(|payload| serde_json::from_str::<ResultEvent>(&payload).map_err(|e| e.to_string()));

            let event = match event {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("[RESULTS] Skipping undecodable result message: {}", e);
                    None
                }
            };
            futures_util::future::ready(event)
        });

        Ok(stream.boxed())
    }
}

fn queue_err(err: RedisError) -> AppError {
    AppError::Queue(err.to_string())
}
