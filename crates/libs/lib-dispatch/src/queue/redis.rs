//! Redis Streams task log.
//!
//! Entries are `XADD`ed with the fields `task` and `jwt`. Consumption goes through
//! `XAUTOCLAIM` (idle pending entries first) and then `XREADGROUP ... >`.
//!
//! Blocking reads get their own connection: a blocked `XREADGROUP` on a multiplexed
//! connection would stall every append queued behind it.

use std::time::Duration;

use async_trait::async_trait;
use lib_core::{AppError, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError, Value};
use tokio::sync::Mutex;

use super::{ClaimedEntry, EntryId, PendingEntry, QueueEntry, TaskQueue};

const DEFAULT_RECLAIM_IDLE: Duration = Duration::from_secs(300);
const PENDING_SCAN_LIMIT: usize = 1000;

pub struct RedisTaskQueue {
    commands: ConnectionManager,
    blocking: Mutex<ConnectionManager>,
    stream: String,
    reclaim_idle: Duration,
}

impl RedisTaskQueue {
    pub async fn connect(redis_url: &str, stream: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(queue_err)?;
        let commands = ConnectionManager::new(client.clone()).await.map_err(queue_err)?;
        let blocking = ConnectionManager::new(client).await.map_err(queue_err)?;

        Ok(Self {
            commands,
            blocking: Mutex::new(blocking),
            stream: stream.into(),
            reclaim_idle: DEFAULT_RECLAIM_IDLE,
        })
    }

    pub fn with_reclaim_idle(mut self, reclaim_idle: Duration) -> Self {
        self.reclaim_idle = reclaim_idle;
        self
    }

    async fn reclaim_idle(&self, group: &str, consumer: &str) -> Result<Option<ClaimedEntry>> {
        let mut conn = self.commands.clone();

        // XAUTOCLAIM <stream> <group> <consumer> <min-idle-ms> 0-0 COUNT 1
        let reply: Vec<Value> = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(group)
            .arg(consumer)
            .arg(self.reclaim_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        let Some(claimed) = reply.get(1) else {
            return Ok(None);
        };
        let claimed: StreamRangeReply = redis::from_redis_value(claimed).map_err(queue_err)?;
        let Some(stream_id) = claimed.ids.into_iter().next() else {
            return Ok(None);
        };

        let detail: StreamPendingCountReply = conn
            .xpending_count(&self.stream, group, &stream_id.id, &stream_id.id, 1)
            .await
            .map_err(queue_err)?;
        let delivery_count = detail
            .ids
            .first()
            .map(|p| p.times_delivered as u32)
            .unwrap_or(2);

        tracing::warn!(
            "[QUEUE] Reclaimed idle entry {} for {} (delivery {})",
            stream_id.id,
            consumer,
            delivery_count
        );

        Ok(Some(to_claimed(stream_id, delivery_count)))
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        let mut conn = self.commands.clone();
        let created: std::result::Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                tracing::info!("[QUEUE] Created consumer group {} on {}", group, self.stream);
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => {
                tracing::debug!("[QUEUE] Consumer group {} already exists on {}", group, self.stream);
                Ok(())
            }
            Err(err) => Err(queue_err(err)),
        }
    }

    async fn append(&self, entry: &QueueEntry) -> Result<EntryId> {
        let mut conn = self.commands.clone();
        let id: String = conn
            .xadd(
                &self.stream,
                "*",
                &[
                    (QueueEntry::TASK_FIELD, entry.task.as_str()),
                    (QueueEntry::JWT_FIELD, entry.jwt.as_str()),
                ],
            )
            .await
            .map_err(queue_err)?;

        Ok(EntryId::new(id))
    }

    async fn claim(&self, group: &str, consumer: &str, block: Duration) -> Result<Option<ClaimedEntry>> {
        if let Some(reclaimed) = self.reclaim_idle(group, consumer).await? {
            return Ok(Some(reclaimed));
        }

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block.as_millis().max(1) as usize);

        let mut conn = self.blocking.lock().await;
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(queue_err)?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        Ok(entry.map(|id| to_claimed(id, 1)))
    }

    async fn ack(&self, group: &str, id: &EntryId) -> Result<bool> {
        let mut conn = self.commands.clone();
        let acked: usize = conn
            .xack(&self.stream, group, &[id.as_str()])
            .await
            .map_err(queue_err)?;

        Ok(acked > 0)
    }

    async fn pending(&self, group: &str) -> Result<Vec<PendingEntry>> {
        let mut conn = self.commands.clone();
        let reply: StreamPendingCountReply = conn
            .xpending_count(&self.stream, group, "-", "+", PENDING_SCAN_LIMIT)
            .await
            .map_err(queue_err)?;

        Ok(reply
            .ids
            .into_iter()
            .map(|p| PendingEntry {
                id: EntryId::new(p.id),
                consumer: p.consumer,
                idle: Duration::from_millis(p.last_delivered_ms as u64),
                delivery_count: p.times_delivered as u32,
            })
            .collect())
    }
}

fn to_claimed(stream_id: StreamId, delivery_count: u32) -> ClaimedEntry {
    let task: String = stream_id.get(QueueEntry::TASK_FIELD).unwrap_or_default();
    let jwt: String = stream_id.get(QueueEntry::JWT_FIELD).unwrap_or_default();

    ClaimedEntry {
        id: EntryId::new(stream_id.id),
        entry: QueueEntry { task, jwt },
        delivery_count,
    }
}

fn queue_err(err: RedisError) -> AppError {
    AppError::Queue(err.to_string())
}
