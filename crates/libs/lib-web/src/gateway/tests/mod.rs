//! # Gateway Tests
//!
//! Intake and fan-out tests run the gateway against an in-memory database; frames
//! are read straight off the connection handle's channel.

mod intake;

use super::*;
use async_trait::async_trait;
use lib_auth::decode_delegated_token;
use lib_core::model::store::ChatRepository;
use lib_core::{create_pool, migrate, DbPool, SqliteChatStore};
use lib_dispatch::{ClaimedEntry, EntryId, PendingEntry, SqliteTaskQueue};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const GROUP: &str = "message_workers";
pub const DELEGATED_SECRET: &str = "delegated-secret-key-must-be-32-chars-long";

pub struct TestGateway {
    pub gateway: Gateway,
    pub pool: DbPool,
    pub queue: SqliteTaskQueue,
    pub conn: ConnectionHandle,
    pub rx: UnboundedReceiver<ServerFrame>,
}

impl TestGateway {
    /// Frames pushed so far, in order.
    pub fn frames(&mut self) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub async fn send(&mut self, raw: &str) -> Vec<ServerFrame> {
        self.gateway.handle_frame(&self.conn, raw.as_bytes()).await;
        self.frames()
    }

    pub async fn claim_task(&self) -> Option<(Task, String)> {
        let claimed = self.queue.claim(GROUP, "test", Duration::ZERO).await.unwrap()?;
        Some((claimed.entry.decode_task().unwrap(), claimed.entry.jwt))
    }
}

pub async fn setup_test_db() -> DbPool {
    let pool = create_pool("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    migrate(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn test_minter() -> DelegatedTokenMinter {
    DelegatedTokenMinter::new(DELEGATED_SECRET, chrono::Duration::minutes(5))
}

pub async fn test_gateway() -> TestGateway {
    let pool = setup_test_db().await;
    let queue = SqliteTaskQueue::new(pool.clone(), "message:stream");
    queue.ensure_group(GROUP).await.unwrap();

    let gateway = Gateway::new(
        Arc::new(SqliteChatStore::new(pool.clone())),
        Arc::new(queue.clone()),
        test_minter(),
        ConnectionRegistry::new(),
    );

    let (conn, rx) = ConnectionHandle::new("u1");
    gateway.registry().register(conn.clone()).await;

    TestGateway {
        gateway,
        pool,
        queue,
        conn,
        rx,
    }
}

/// Queue whose appends always fail.
pub struct UnreachableQueue;

#[async_trait]
impl TaskQueue for UnreachableQueue {
    async fn ensure_group(&self, _group: &str) -> Result<()> {
        Err(AppError::Queue("connection refused".to_string()))
    }

    async fn append(&self, _entry: &QueueEntry) -> Result<EntryId> {
        Err(AppError::Queue("connection refused".to_string()))
    }

    async fn claim(&self, _group: &str, _consumer: &str, _block: Duration) -> Result<Option<ClaimedEntry>> {
        Err(AppError::Queue("connection refused".to_string()))
    }

    async fn ack(&self, _group: &str, _id: &EntryId) -> Result<bool> {
        Err(AppError::Queue("connection refused".to_string()))
    }

    async fn pending(&self, _group: &str) -> Result<Vec<PendingEntry>> {
        Err(AppError::Queue("connection refused".to_string()))
    }
}
