//! SQLite-backed task log.
//!
//! Three tables (see the `task_queue` migration in lib-core):
//!
//! - `queue_entries` - the append-only log, ids from `AUTOINCREMENT` so they are
//!   never reused and always increase
//! - `queue_groups` - one cursor per consumer group: the highest id handed out
//! - `queue_pending` - claimed entries awaiting acknowledgement
//!
//! A claim runs in one transaction that first takes the write lock, so two
//! consumers never receive the same new entry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lib_core::{AppError, DbPool, Result};
use lib_utils::now_millis;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{ClaimedEntry, EntryId, PendingEntry, QueueEntry, TaskQueue};

/// Upper bound between store polls while a claim is blocked. Appends made by this
/// process wake waiters immediately; the poll covers other processes and entries
/// becoming reclaimable.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const DEFAULT_RECLAIM_IDLE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: DbPool,
    stream: String,
    reclaim_idle: Duration,
    appended: Arc<Notify>,
}

impl SqliteTaskQueue {
    pub fn new(pool: DbPool, stream: impl Into<String>) -> Self {
        Self {
            pool,
            stream: stream.into(),
            reclaim_idle: DEFAULT_RECLAIM_IDLE,
            appended: Arc::new(Notify::new()),
        }
    }

    /// Pending entries idle at least this long are redelivered on the next claim.
    pub fn with_reclaim_idle(mut self, reclaim_idle: Duration) -> Self {
        self.reclaim_idle = reclaim_idle;
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// One non-blocking claim attempt.
    async fn try_claim(&self, group: &str, consumer: &str) -> Result<Option<ClaimedEntry>> {
        let now = now_millis();
        let mut tx = self.pool.begin().await.map_err(queue_err)?;

        // Touch the group row first: takes the write lock and checks the group exists.
        let touched = sqlx::query(
            "UPDATE queue_groups SET last_delivered_id = last_delivered_id WHERE stream = ? AND group_name = ?",
        )
        .bind(&self.stream)
        .bind(group)
        .execute(&mut *tx)
        .await
        .map_err(queue_err)?;

        if touched.rows_affected() == 0 {
            return Err(AppError::Queue(format!(
                "consumer group {} does not exist on {}",
                group, self.stream
            )));
        }

        let idle_before = now - self.reclaim_idle.as_millis() as i64;
        let stale: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT entry_id, delivery_count FROM queue_pending
            WHERE stream = ? AND group_name = ? AND delivered_at_ms <= ?
            ORDER BY entry_id ASC
            LIMIT 1
            "#,
        )
        .bind(&self.stream)
        .bind(group)
        .bind(idle_before)
        .fetch_optional(&mut *tx)
        .await
        .map_err(queue_err)?;

        if let Some((entry_id, delivery_count)) = stale {
            sqlx::query(
                r#"
                UPDATE queue_pending
                SET consumer = ?, delivered_at_ms = ?, delivery_count = delivery_count + 1
                WHERE stream = ? AND group_name = ? AND entry_id = ?
                "#,
            )
            .bind(consumer)
            .bind(now)
            .bind(&self.stream)
            .bind(group)
            .bind(entry_id)
            .execute(&mut *tx)
            .await
            .map_err(queue_err)?;

            let (task, jwt): (String, String) =
                sqlx::query_as("SELECT task, jwt FROM queue_entries WHERE id = ?")
                    .bind(entry_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(queue_err)?;

            tx.commit().await.map_err(queue_err)?;

            tracing::warn!(
                "[QUEUE] Reclaimed idle entry {} for {} (delivery {})",
                entry_id,
                consumer,
                delivery_count + 1
            );

            return Ok(Some(ClaimedEntry {
                id: EntryId::new(entry_id.to_string()),
                entry: QueueEntry { task, jwt },
                delivery_count: (delivery_count + 1) as u32,
            }));
        }

        let next: Option<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT e.id, e.task, e.jwt FROM queue_entries e
            JOIN queue_groups g ON g.stream = e.stream AND g.group_name = ?
            WHERE e.stream = ? AND e.id > g.last_delivered_id
            ORDER BY e.id ASC
            LIMIT 1
            "#,
        )
        .bind(group)
        .bind(&self.stream)
        .fetch_optional(&mut *tx)
        .await
        .map_err(queue_err)?;

        let Some((entry_id, task, jwt)) = next else {
            tx.rollback().await.map_err(queue_err)?;
            return Ok(None);
        };

        sqlx::query("UPDATE queue_groups SET last_delivered_id = ? WHERE stream = ? AND group_name = ?")
            .bind(entry_id)
            .bind(&self.stream)
            .bind(group)
            .execute(&mut *tx)
            .await
            .map_err(queue_err)?;

        sqlx::query(
            r#"
            INSERT INTO queue_pending (stream, group_name, entry_id, consumer, delivered_at_ms, delivery_count)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&self.stream)
        .bind(group)
        .bind(entry_id)
        .bind(consumer)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(queue_err)?;

        tx.commit().await.map_err(queue_err)?;

        Ok(Some(ClaimedEntry {
            id: EntryId::new(entry_id.to_string()),
            entry: QueueEntry { task, jwt },
            delivery_count: 1,
        }))
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO queue_groups (stream, group_name, last_delivered_id, created_at_ms)
            VALUES (?, ?, 0, ?)
            ON CONFLICT (stream, group_name) DO NOTHING
            "#,
        )
        .bind(&self.stream)
        .bind(group)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;

        if result.rows_affected() > 0 {
            tracing::info!("[QUEUE] Created consumer group {} on {}", group, self.stream);
        } else {
            tracing::debug!("[QUEUE] Consumer group {} already exists on {}", group, self.stream);
        }

        Ok(())
    }

    async fn append(&self, entry: &QueueEntry) -> Result<EntryId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO queue_entries (stream, task, jwt, created_at_ms) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.stream)
        .bind(&entry.task)
        .bind(&entry.jwt)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(queue_err)?;

        self.appended.notify_waiters();

        Ok(EntryId::new(id.to_string()))
    }

    async fn claim(&self, group: &str, consumer: &str, block: Duration) -> Result<Option<ClaimedEntry>> {
        let deadline = Instant::now() + block;

        loop {
            // Register interest before looking, so an append between the look and
            // the wait still wakes us.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(claimed) = self.try_claim(group, consumer).await? {
                return Ok(Some(claimed));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let _ = tokio::time::timeout((deadline - now).min(POLL_INTERVAL), appended).await;
        }
    }

    async fn ack(&self, group: &str, id: &EntryId) -> Result<bool> {
        let Ok(entry_id) = id.as_str().parse::<i64>() else {
            tracing::warn!("[QUEUE] Ack for malformed entry id {}", id);
            return Ok(false);
        };

        let result = sqlx::query("DELETE FROM queue_pending WHERE stream = ? AND group_name = ? AND entry_id = ?")
            .bind(&self.stream)
            .bind(group)
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn pending(&self, group: &str) -> Result<Vec<PendingEntry>> {
        let rows: Vec<(i64, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT entry_id, consumer, delivered_at_ms, delivery_count FROM queue_pending
            WHERE stream = ? AND group_name = ?
            ORDER BY entry_id ASC
            "#,
        )
        .bind(&self.stream)
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err)?;

        let now = now_millis();
        Ok(rows
            .into_iter()
            .map(|(entry_id, consumer, delivered_at_ms, delivery_count)| PendingEntry {
                id: EntryId::new(entry_id.to_string()),
                consumer,
                idle: Duration::from_millis((now - delivered_at_ms).max(0) as u64),
                delivery_count: delivery_count as u32,
            })
            .collect())
    }
}

fn queue_err(err: sqlx::Error) -> AppError {
    AppError::Queue(err.to_string())
}
