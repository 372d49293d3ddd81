//! Result fan-out: result channel → registry → socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lib_core::Result;
use lib_dispatch::{ResultChannel, ResultStream};
use shared::dto::ResultEvent;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::ConnectionRegistry;

/// Forward `event` to the connection that submitted its task, then drop the binding.
///
/// Returns `false` when no open connection owns the task; the event is dropped.
pub async fn deliver(registry: &ConnectionRegistry, event: ResultEvent) -> bool {
    let task_id = event.task_id.clone();

    let Some(conn) = registry.release_task(&task_id).await else {
        tracing::debug!("[FANOUT] No connection for task {}, dropping result", task_id);
        return false;
    };

    if conn.send(event.into_frame()) {
        tracing::debug!("[FANOUT] Delivered task {} to connection {}", task_id, conn.id());
        true
    } else {
        tracing::debug!("[FANOUT] Connection {} closed before task {} finished", conn.id(), task_id);
        false
    }
}

/// Subscribe to `results` and spawn the delivery loop.
///
/// The first subscription happens before this returns, so no event published
/// afterwards is missed. If the subscription later ends, the loop resubscribes
/// after `backoff`.
pub async fn spawn_result_fanout(
    registry: ConnectionRegistry,
    results: Arc<dyn ResultChannel>,
    cancel: CancellationToken,
    backoff: Duration,
) -> Result<JoinHandle<()>> {
    let first = results.subscribe().await?;
    tracing::info!("[FANOUT] Subscribed to result channel");

    Ok(tokio::spawn(async move {
        let mut stream = Some(first);

        loop {
            let current = match stream.take() {
                Some(current) => current,
                None => match results.subscribe().await {
                    Ok(current) => {
                        tracing::info!("[FANOUT] Resubscribed to result channel");
                        current
                    }
                    Err(e) => {
                        tracing::error!("[FANOUT] Subscribe failed: {}", e);
                        if !sleep_or_cancel(&cancel, backoff).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            if !pump(&registry, current, &cancel).await {
                break;
            }

            tracing::warn!("[FANOUT] Result subscription ended");
            if !sleep_or_cancel(&cancel, backoff).await {
                break;
            }
        }

        tracing::info!("[FANOUT] Stopped");
    }))
}

/// Deliver events until the stream ends (`true`) or `cancel` fires (`false`).
async fn pump(registry: &ConnectionRegistry, mut stream: ResultStream, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            event = stream.next() => match event {
                Some(event) => {
                    deliver(registry, event).await;
                }
                None => return true,
            },
        }
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
