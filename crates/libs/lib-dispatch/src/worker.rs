//! # Worker
//!
//! Long-running consumer: claims one queue entry at a time, calls the AI responder,
//! stores the reply, publishes the outcome, and only then acknowledges the entry.
//!
//! ## Outcomes per claimed entry
//!
//! | What happened                        | Result event | Ack |
//! |--------------------------------------|--------------|-----|
//! | Responder answered, reply stored     | success      | yes |
//! | Responder failed / timed out / store | failure      | yes |
//! | Entry not decodable                  | none         | yes |
//! | Publish or ack failed                | -            | no  |
//!
//! The last row is an infrastructure fault: the loop logs it, backs off, and the
//! entry stays pending until the queue hands it out again.
//!
//! Shutdown is only observed while waiting for work. A claimed entry is always
//! processed to its outcome first.

use std::sync::Arc;
use std::time::Duration;

use lib_core::{AppError, ChatStore, Config, Result};
use lib_utils::elapsed_since;
use shared::dto::{ResultEvent, Task};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::queue::{ClaimedEntry, TaskQueue};
use crate::responder::{Responder, ResponderRequest};
use crate::results::ResultChannel;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer group to join
    pub group: String,
    /// This process's consumer identity within the group
    pub consumer: String,
    /// Longest a single claim waits for an entry
    pub claim_block: Duration,
    /// Pause after an infrastructure fault
    pub backoff: Duration,
    /// Upper bound on one responder call
    pub responder_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            group: config.consumer_group.clone(),
            consumer: format!("worker_{}", Uuid::new_v4()),
            claim_block: config.claim_block(),
            backoff: config.worker_backoff(),
            responder_timeout: config.responder_timeout(),
        }
    }
}

/// What one [`Worker::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The claim wait elapsed with nothing to do.
    Idle,
    /// A task reached its outcome, was published and acknowledged.
    Completed { task_id: String, success: bool },
    /// An undecodable entry with no recoverable task id was acknowledged
    /// without a result.
    Discarded,
}

pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultChannel>,
    store: Arc<dyn ChatStore>,
    responder: Arc<dyn Responder>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultChannel>,
        store: Arc<dyn ChatStore>,
        responder: Arc<dyn Responder>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            results,
            store,
            responder,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the claim-process-ack loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let group = self.config.group.clone();
        let consumer = self.config.consumer.clone();

        while let Err(e) = self.queue.ensure_group(&group).await {
            tracing::error!("[WORKER] Failed to ensure consumer group {}: {}", group, e);
            if !self.back_off(&cancel).await {
                return;
            }
        }

        self.log_backlog().await;
        tracing::info!("[WORKER] Consumer {} started in group {}", consumer, group);

        loop {
            let claimed = tokio::select! {
                _ = cancel.cancelled() => break,
                claimed = self.queue.claim(&group, &consumer, self.config.claim_block) => claimed,
            };

            let outcome = match claimed {
                Ok(Some(claimed)) => self.handle(claimed).await,
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                tracing::error!("[WORKER] Queue error: {}", e);
                if !self.back_off(&cancel).await {
                    break;
                }
            }
        }

        tracing::info!("[WORKER] Consumer {} stopped", consumer);
    }

    /// Claim at most one entry and carry it to its outcome.
    pub async fn step(&self) -> Result<StepOutcome> {
        let claimed = self
            .queue
            .claim(&self.config.group, &self.config.consumer, self.config.claim_block)
            .await?;

        match claimed {
            Some(claimed) => self.handle(claimed).await,
            None => Ok(StepOutcome::Idle),
        }
    }

    /// Call the responder for `task` and store its reply.
    ///
    /// Every error returned here is a task failure, never a queue fault.
    pub async fn process(&self, task: &Task, bearer: &str) -> Result<String> {
        let request = ResponderRequest::from(task);

        let reply = tokio::time::timeout(self.config.responder_timeout, self.responder.respond(&request, bearer))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "AI responder did not answer within {}s",
                    self.config.responder_timeout.as_secs_f32()
                ))
            })??;

        self.store.create_message(&task.chat_id, &reply, false, None).await?;

        Ok(reply)
    }

    async fn handle(&self, claimed: ClaimedEntry) -> Result<StepOutcome> {
        let task = match claimed.entry.decode_task() {
            Ok(task) => task,
            Err(e) => {
                let Some(task_id) = claimed.entry.recover_task_id() else {
                    tracing::error!("[WORKER] Discarding undecodable entry {}: {}", claimed.id, e);
                    self.ack(&claimed).await?;
                    return Ok(StepOutcome::Discarded);
                };

                tracing::error!("[WORKER] Task {} in entry {} is undecodable: {}", task_id, claimed.id, e);
                return self.finish(&claimed, ResultEvent::failure(&task_id, e.user_message())).await;
            }
        };

        if claimed.delivery_count > 1 {
            tracing::warn!(
                "[WORKER] Task {} redelivered (delivery {})",
                task.task_id,
                claimed.delivery_count
            );
        }
        let queued = elapsed_since(&task.created_at).unwrap_or_default();
        tracing::info!(
            "[WORKER] Processing task {} for chat {} (queued {:.2}s)",
            task.task_id,
            task.chat_id,
            queued.as_secs_f64()
        );

        let event = match self.process(&task, &claimed.entry.jwt).await {
            Ok(reply) => ResultEvent::success(&task.task_id, reply),
            Err(e) => {
                tracing::warn!("[WORKER] Task {} failed: {}", task.task_id, e);
                ResultEvent::failure(&task.task_id, e.user_message())
            }
        };

        self.finish(&claimed, event).await
    }

    /// Publish `event`, then acknowledge the entry it answers.
    async fn finish(&self, claimed: &ClaimedEntry, event: ResultEvent) -> Result<StepOutcome> {
        let receivers = self.results.publish(&event).await?;
        self.ack(claimed).await?;

        tracing::info!(
            "[WORKER] Task {} completed (success: {}, subscribers: {})",
            event.task_id,
            event.success,
            receivers
        );

        Ok(StepOutcome::Completed {
            task_id: event.task_id,
            success: event.success,
        })
    }

    async fn ack(&self, claimed: &ClaimedEntry) -> Result<()> {
        if !self.queue.ack(&self.config.group, &claimed.id).await? {
            tracing::warn!("[WORKER] Entry {} was no longer pending at ack", claimed.id);
        }
        Ok(())
    }

    async fn log_backlog(&self) {
        match self.queue.pending(&self.config.group).await {
            Ok(pending) if !pending.is_empty() => {
                tracing::warn!(
                    "[WORKER] {} unacknowledged entr(ies) in group {}, oldest idle {:?}",
                    pending.len(),
                    self.config.group,
                    pending.iter().map(|p| p.idle).max().unwrap_or_default()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("[WORKER] Could not inspect pending entries: {}", e),
        }
    }

    /// Sleep for the backoff period. Returns `false` if cancelled meanwhile.
    async fn back_off(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.backoff) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueEntry, SqliteTaskQueue};
    use crate::results::{BroadcastResultChannel, ResultStream};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use lib_core::model::store::ChatRepository;
    use lib_core::{create_pool, migrate, SqliteChatStore};
    use shared::dto::TaskKind;
    use std::sync::Mutex;

    const GROUP: &str = "message_workers";

    enum Reply {
        Text(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct StubResponder {
        reply: Reply,
        bearers: Mutex<Vec<String>>,
    }

    impl StubResponder {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                bearers: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Responder for StubResponder {
        async fn respond(&self, _request: &ResponderRequest, bearer: &str) -> Result<String> {
            self.bearers.lock().unwrap().push(bearer.to_string());
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail(msg) => Err(AppError::Responder(msg.to_string())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    /// Records how many entries were still pending at each publish.
    struct PendingAtPublish {
        queue: SqliteTaskQueue,
        seen: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl ResultChannel for PendingAtPublish {
        async fn publish(&self, _event: &ResultEvent) -> Result<usize> {
            let pending = self.queue.pending(GROUP).await?.len();
            self.seen.lock().unwrap().push(pending);
            if self.fail {
                return Err(AppError::Queue("channel unreachable".to_string()));
            }
            Ok(1)
        }

        async fn subscribe(&self) -> Result<ResultStream> {
            Ok(futures_util::stream::empty().boxed())
        }
    }

    struct Fixture {
        queue: SqliteTaskQueue,
        store: SqliteChatStore,
        chat_id: String,
    }

    async fn fixture() -> Fixture {
        let pool = create_pool("sqlite::memory:").await.expect("Failed to create test database");
        migrate(&pool).await.expect("Failed to run migrations");

        let queue = SqliteTaskQueue::new(pool.clone(), "message:stream");
        queue.ensure_group(GROUP).await.unwrap();

        let store = SqliteChatStore::new(pool);
        let chat = store.create_chat("u1", "hello", "s1").await.unwrap();

        Fixture {
            queue,
            store,
            chat_id: chat.id,
        }
    }

    fn task(chat_id: &str, task_id: &str) -> Task {
        Task {
            task_id: task_id.to_string(),
            kind: TaskKind::ProcessMessage,
            user_id: "u1".to_string(),
            chat_id: chat_id.to_string(),
            session_id: "s1".to_string(),
            message_text: "hello".to_string(),
            origin_connection_id: None,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn worker_config() -> WorkerConfig {
        WorkerConfig {
            group: GROUP.to_string(),
            consumer: "worker_test".to_string(),
            claim_block: Duration::from_millis(50),
            backoff: Duration::from_millis(20),
            responder_timeout: Duration::from_millis(100),
        }
    }

    fn worker(f: &Fixture, results: Arc<dyn ResultChannel>, responder: Arc<dyn Responder>) -> Worker {
        Worker::new(
            Arc::new(f.queue.clone()),
            results,
            Arc::new(f.store.clone()),
            responder,
            worker_config(),
        )
    }

    #[tokio::test]
    async fn test_idle_step() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let worker = worker(&f, results, StubResponder::new(Reply::Text("hi")));

        assert_eq!(worker.step().await.unwrap(), StepOutcome::Idle);
    }

    #[tokio::test]
    async fn test_success_stores_reply_publishes_and_acks() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let mut events = results.subscribe().await.unwrap();
        let responder = StubResponder::new(Reply::Text("hi there"));
        let worker = worker(&f, results, responder.clone());

        f.queue
            .append(&QueueEntry::new(&task(&f.chat_id, "t1"), "delegated-jwt").unwrap())
            .await
            .unwrap();

        let outcome = worker.step().await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed {
                task_id: "t1".to_string(),
                success: true
            }
        );

        assert_eq!(events.next().await, Some(ResultEvent::success("t1", "hi there")));
        assert_eq!(responder.bearers.lock().unwrap().as_slice(), ["delegated-jwt"]);
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());

        let messages = ChatRepository::list_messages(f.store.pool(), &f.chat_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi there");
        assert!(!messages[0].is_user_message);
        assert!(messages[0].user_id.is_none());
    }

    #[tokio::test]
    async fn test_responder_failure_publishes_failure_and_acks() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let mut events = results.subscribe().await.unwrap();
        let worker = worker(&f, results, StubResponder::new(Reply::Fail("AI responder request failed: 502")));

        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t1"), "jwt").unwrap()).await.unwrap();

        let outcome = worker.step().await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed {
                task_id: "t1".to_string(),
                success: false
            }
        );

        let event = events.next().await.unwrap();
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("AI responder request failed: 502"));
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_responder_timeout_is_task_failure() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let mut events = results.subscribe().await.unwrap();
        let worker = worker(&f, results, StubResponder::new(Reply::Hang));

        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t1"), "jwt").unwrap()).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), worker.step())
            .await
            .expect("timeout must be enforced by the worker")
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Completed { success: false, .. }));

        let event = events.next().await.unwrap();
        assert_eq!(event.task_id, "t1");
        assert!(event.error.unwrap().contains("did not answer"));
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_discarded() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let worker = worker(&f, results, StubResponder::new(Reply::Text("hi")));

        f.queue
            .append(&QueueEntry {
                task: "not json".to_string(),
                jwt: "jwt".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(worker.step().await.unwrap(), StepOutcome::Discarded);
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_task_publishes_failure_before_ack() {
        let f = fixture().await;
        let results = Arc::new(PendingAtPublish {
            queue: f.queue.clone(),
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let broadcast = Arc::new(BroadcastResultChannel::new("message:processed"));
        let mut events = broadcast.subscribe().await.unwrap();
        let responder = StubResponder::new(Reply::Text("hi"));

        f.queue
            .append(&QueueEntry {
                task: r#"{"taskId":"t-partial","chatId":"c1"}"#.to_string(),
                jwt: "jwt".to_string(),
            })
            .await
            .unwrap();

        let outcome = worker(&f, results.clone(), responder.clone()).step().await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed {
                task_id: "t-partial".to_string(),
                success: false
            }
        );
        assert_eq!(results.seen.lock().unwrap().as_slice(), [1]);
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());
        assert!(responder.bearers.lock().unwrap().is_empty());

        f.queue
            .append(&QueueEntry {
                task: r#"{"taskId":"t-second"}"#.to_string(),
                jwt: "jwt".to_string(),
            })
            .await
            .unwrap();
        worker(&f, broadcast, responder).step().await.unwrap();

        let event = events.next().await.unwrap();
        assert_eq!(event.task_id, "t-second");
        assert!(!event.success);
        assert!(event.error.is_some());
    }

    #[tokio::test]
    async fn test_publish_happens_before_ack() {
        let f = fixture().await;
        let results = Arc::new(PendingAtPublish {
            queue: f.queue.clone(),
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let worker = worker(&f, results.clone(), StubResponder::new(Reply::Text("hi")));

        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t1"), "jwt").unwrap()).await.unwrap();
        worker.step().await.unwrap();

        assert_eq!(results.seen.lock().unwrap().as_slice(), [1]);
        assert!(f.queue.pending(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_entry_pending() {
        let f = fixture().await;
        let results = Arc::new(PendingAtPublish {
            queue: f.queue.clone(),
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let worker = worker(&f, results, StubResponder::new(Reply::Text("hi")));

        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t1"), "jwt").unwrap()).await.unwrap();

        let err = worker.step().await.unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(f.queue.pending(GROUP).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_until_cancelled() {
        let f = fixture().await;
        let results = Arc::new(BroadcastResultChannel::new("message:processed"));
        let mut events = results.subscribe().await.unwrap();
        let worker = worker(&f, results, StubResponder::new(Reply::Text("hi there")));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t1"), "jwt").unwrap()).await.unwrap();
        f.queue.append(&QueueEntry::new(&task(&f.chat_id, "t2"), "jwt").unwrap()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap();
        assert_eq!(first.task_id, "t1");
        assert_eq!(second.task_id, "t2");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop after cancellation")
            .unwrap();
    }
}
