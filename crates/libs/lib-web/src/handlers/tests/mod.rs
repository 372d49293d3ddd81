//! # Handler Tests
//!
//! Router-level tests: handshake rejections through `oneshot`, and full
//! socket round trips against a real listener with a mock AI responder.


use crate::gateway::{spawn_result_fanout, ConnectionRegistry, Gateway};
use crate::server::{create_router, AppState};
use axum::routing::post;
use axum::{Json, Router};
use lib_auth::{encode_access_token, DelegatedTokenMinter, JwtVerifier};
use lib_core::{create_pool, migrate, DbPool, SqliteChatStore};
use async_trait::async_trait;
use lib_dispatch::{
    BroadcastResultChannel, ClaimedEntry, EntryId, PendingEntry, QueueEntry, SqliteTaskQueue, TaskQueue,
    WebhookResponder, Worker, WorkerConfig,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ACCESS_SECRET: &str = "access-secret-key-must-be-at-least-32-chars";
pub const DELEGATED_SECRET: &str = "delegated-secret-key-must-be-32-chars-long";
pub const GROUP: &str = "message_workers";

pub async fn setup_test_db() -> DbPool {
    let pool = create_pool("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    migrate(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn access_token(user_id: &str) -> String {
    encode_access_token(user_id, ACCESS_SECRET, chrono::Duration::minutes(5)).unwrap()
}

/// A running relay: router on a real port, worker and fan-out in the background.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub pool: DbPool,
    pub queue: SqliteTaskQueue,
    pub shutdown: CancellationToken,
}

impl TestRelay {
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Router with a worker that will never see a task; enough for handshake tests.
pub async fn test_router() -> Router {
    let pool = setup_test_db().await;
    let queue = SqliteTaskQueue::new(pool.clone(), "message:stream");
    let gateway = Gateway::new(
        Arc::new(SqliteChatStore::new(pool)),
        Arc::new(queue),
        DelegatedTokenMinter::new(DELEGATED_SECRET, chrono::Duration::minutes(5)),
        ConnectionRegistry::new(),
    );
    let state = AppState {
        gateway,
        verifier: Arc::new(JwtVerifier::new(ACCESS_SECRET)),
        shutdown: CancellationToken::new(),
    };
    create_router(state, vec![])
}

/// Serve `responder` on an ephemeral port, returning its `/respond` URL.
pub async fn spawn_responder(responder: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, responder).await.unwrap();
    });
    format!("http://{}/respond", addr)
}

/// Responder answering every task with `reply` after `delay`.
pub fn mock_responder(reply: &'static str, delay: Duration) -> Router {
    Router::new().route(
        "/respond",
        post(move |Json(_body): Json<Value>| async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "output": reply }))
        }),
    )
}

/// Queue whose appends take `delay` before reaching the real queue.
pub struct SlowAppendQueue {
    pub inner: SqliteTaskQueue,
    pub delay: Duration,
}

#[async_trait]
impl TaskQueue for SlowAppendQueue {
    async fn ensure_group(&self, group: &str) -> lib_core::Result<()> {
        self.inner.ensure_group(group).await
    }

    async fn append(&self, entry: &QueueEntry) -> lib_core::Result<EntryId> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(entry).await
    }

    async fn claim(&self, group: &str, consumer: &str, block: Duration) -> lib_core::Result<Option<ClaimedEntry>> {
        self.inner.claim(group, consumer, block).await
    }

    async fn ack(&self, group: &str, id: &EntryId) -> lib_core::Result<bool> {
        self.inner.ack(group, id).await
    }

    async fn pending(&self, group: &str) -> lib_core::Result<Vec<PendingEntry>> {
        self.inner.pending(group).await
    }
}

pub async fn spawn_relay(responder_url: &str, responder_timeout: Duration) -> TestRelay {
    spawn_relay_with_queue(responder_url, responder_timeout, |queue| Arc::new(queue) as Arc<dyn TaskQueue>).await
}

/// Like [`spawn_relay`], with the gateway appending through `gateway_queue(queue)`.
pub async fn spawn_relay_with_queue(
    responder_url: &str,
    responder_timeout: Duration,
    gateway_queue: impl FnOnce(SqliteTaskQueue) -> Arc<dyn TaskQueue>,
) -> TestRelay {
    let pool = setup_test_db().await;
    let queue = SqliteTaskQueue::new(pool.clone(), "message:stream");
    queue.ensure_group(GROUP).await.unwrap();
    let results = Arc::new(BroadcastResultChannel::new("message:results"));
    let store = Arc::new(SqliteChatStore::new(pool.clone()));
    let registry = ConnectionRegistry::new();
    let shutdown = CancellationToken::new();

    let gateway = Gateway::new(
        store.clone(),
        gateway_queue(queue.clone()),
        DelegatedTokenMinter::new(DELEGATED_SECRET, chrono::Duration::minutes(5)),
        registry.clone(),
    );

    spawn_result_fanout(registry, results.clone(), shutdown.clone(), Duration::from_millis(50))
        .await
        .unwrap();

    let worker = Worker::new(
        Arc::new(queue.clone()),
        results,
        store,
        Arc::new(WebhookResponder::new(responder_url).unwrap()),
        WorkerConfig {
            group: GROUP.to_string(),
            consumer: "worker_test".to_string(),
            claim_block: Duration::from_millis(200),
            backoff: Duration::from_millis(50),
            responder_timeout,
        },
    );
    tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState {
        gateway,
        verifier: Arc::new(JwtVerifier::new(ACCESS_SECRET)),
        shutdown: shutdown.clone(),
    };
    let app = create_router(state, vec![]);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
            .unwrap();
    });

    TestRelay {
        addr,
        pool,
        queue,
        shutdown,
    }
}
