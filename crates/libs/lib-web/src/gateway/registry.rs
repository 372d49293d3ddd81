//! # Connection Registry
//!
//! Concurrent map of live connections, indexed two ways:
//!
//! - by connection id, for the lifetime of the connection
//! - by task id, from the moment a task is accepted until its result is delivered
//!   or its connection goes away
//!
//! Result events only carry a task id, so the task index is what lets the fan-out
//! find the socket a result belongs to. Each connection remembers its own task ids,
//! so unregistering it purges all of them in the same critical section.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shared::dto::ServerFrame;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Sending half of one live connection.
///
/// Frames pushed here are written to the socket in order by the connection's
/// writer task. Cloning is cheap; all clones feed the same socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: String,
    user_id: String,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionHandle {
    /// New handle with a fresh connection id, and the receiver its writer drains.
    pub fn new(user_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue `frame` for the socket. Returns `false` if the connection is gone.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

struct Slot {
    handle: ConnectionHandle,
    tasks: HashSet<String>,
}

#[derive(Default)]
struct Index {
    connections: HashMap<String, Slot>,
    tasks: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Index>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        let mut index = self.inner.write().await;
        index.connections.insert(
            handle.id.clone(),
            Slot {
                handle,
                tasks: HashSet::new(),
            },
        );
    }

    pub async fn lookup(&self, connection_id: &str) -> Option<ConnectionHandle> {
        let index = self.inner.read().await;
        index.connections.get(connection_id).map(|slot| slot.handle.clone())
    }

    /// Remove a connection and every task id still bound to it.
    ///
    /// Returns how many task bindings were purged.
    pub async fn unregister(&self, connection_id: &str) -> usize {
        let mut index = self.inner.write().await;
        let Some(slot) = index.connections.remove(connection_id) else {
            return 0;
        };

        for task_id in &slot.tasks {
            index.tasks.remove(task_id);
        }
        slot.tasks.len()
    }

    /// Route results for `task_id` to `connection_id`.
    ///
    /// Returns `false` (and binds nothing) if the connection is not registered.
    pub async fn bind_task(&self, task_id: &str, connection_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        let index = &mut *guard;
        let Some(slot) = index.connections.get_mut(connection_id) else {
            return false;
        };

        slot.tasks.insert(task_id.to_string());
        index.tasks.insert(task_id.to_string(), connection_id.to_string());
        true
    }

    pub async fn lookup_task(&self, task_id: &str) -> Option<ConnectionHandle> {
        let index = self.inner.read().await;
        let connection_id = index.tasks.get(task_id)?;
        index.connections.get(connection_id).map(|slot| slot.handle.clone())
    }

    /// Drop the binding for `task_id`, returning the connection it pointed at.
    pub async fn release_task(&self, task_id: &str) -> Option<ConnectionHandle> {
        let mut index = self.inner.write().await;
        let connection_id = index.tasks.remove(task_id)?;
        let slot = index.connections.get_mut(&connection_id)?;
        slot.tasks.remove(task_id);
        Some(slot.handle.clone())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }
}
