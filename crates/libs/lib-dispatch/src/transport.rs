//! Queue and result-channel construction from [`Config`].

use std::sync::Arc;

use lib_core::{Config, DbPool, QueueBackend, Result};

use crate::queue::{SqliteTaskQueue, TaskQueue};
use crate::results::{BroadcastResultChannel, ResultChannel};

/// The queue and result channel shared by the gateway and the worker.
#[derive(Clone)]
pub struct Transport {
    pub queue: Arc<dyn TaskQueue>,
    pub results: Arc<dyn ResultChannel>,
}

/// Open the transport selected by `config.queue_backend`.
pub async fn connect_transport(config: &Config, pool: &DbPool) -> Result<Transport> {
    match config.queue_backend {
        QueueBackend::Sqlite => {
            tracing::info!(
                "[TRANSPORT] SQLite task queue on {}, in-process result channel {}",
                config.queue_stream,
                config.result_channel
            );
            let queue = SqliteTaskQueue::new(pool.clone(), &config.queue_stream)
                .with_reclaim_idle(config.reclaim_idle());
            Ok(Transport {
                queue: Arc::new(queue),
                results: Arc::new(BroadcastResultChannel::new(&config.result_channel)),
            })
        }
        QueueBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &Config) -> Result<Transport> {
    use crate::queue::redis::RedisTaskQueue;
    use crate::results::redis::RedisResultChannel;

    tracing::info!(
        "[TRANSPORT] Redis stream {} and channel {} at {}",
        config.queue_stream,
        config.result_channel,
        config.redis_url
    );
    let queue = RedisTaskQueue::connect(&config.redis_url, &config.queue_stream)
        .await?
        .with_reclaim_idle(config.reclaim_idle());
    let results = RedisResultChannel::connect(&config.redis_url, &config.result_channel).await?;

    Ok(Transport {
        queue: Arc::new(queue),
        results: Arc::new(results),
    })
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &Config) -> Result<Transport> {
    Err(lib_core::AppError::Config(
        "QUEUE_BACKEND=redis requires building with the `redis` feature".to_string(),
    ))
}
