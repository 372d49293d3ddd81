//! # Chat WebSocket
//!
//! **Route**: `GET /ws`
//!
//! The upgrade is only performed after the access token checks out. From then on
//! each connection runs two tasks:
//!
//! - a writer draining the connection's outbound channel onto the socket, fed by
//!   the gateway (acks, errors) and the result fan-out (AI replies)
//! - a reader handing every inbound frame to [`Gateway::handle_frame`], one at a time
//!
//! When either side stops, the connection is unregistered together with all its
//! outstanding task bindings. On server shutdown the reader stops between frames,
//! so a frame already being handled is stored and enqueued in full.
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8000/ws?token=${accessToken}`);
//! ws.send(JSON.stringify({ text: "hello" }));
//! ws.onmessage = (event) => {
//!   const frame = JSON.parse(event.data); // chat_created, message_received, ai_message, error
//! };
//! ```

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use lib_auth::UserIdentity;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::gateway::{authenticate, extract_token, ConnectionHandle, Gateway};
use crate::server::AppState;

/// Authenticate the handshake, then upgrade.
///
/// Missing, expired and invalid tokens are all answered with 401 and no upgrade.
pub async fn chat_websocket(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    headers: HeaderMap,
    uri: Uri,
    State(state): State<AppState>,
) -> Response {
    let token = extract_token(&uri, &headers);

    let identity = match authenticate(state.verifier.as_ref(), token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("[WS] HANDSHAKE_REJECTED reason={}", e);
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("[WS] UPGRADE_FAILED user={} reason={}", identity.user_id, rejection);
            return rejection.into_response();
        }
    };

    debug!("[WS] UPGRADE_START user={}", identity.user_id);
    ws.on_upgrade(move |socket| run_connection(socket, state.gateway, identity, state.shutdown))
}

/// Serve one authenticated connection until it closes or the server shuts down.
pub async fn run_connection(
    mut socket: WebSocket,
    gateway: Gateway,
    identity: UserIdentity,
    shutdown: CancellationToken,
) {
    if identity.user_id.is_empty() {
        warn!("[WS] UNIDENTIFIED - closing connection without user id");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "User not identified".into(),
            })))
            .await;
        return;
    }

    let (handle, mut outbound) = ConnectionHandle::new(identity.user_id);
    let connection_id = handle.id().to_string();
    gateway.registry().register(handle.clone()).await;

    let connection_start = Instant::now();
    info!(
        "[WS] CONNECTED connection_id={} user={}",
        connection_id,
        handle.user_id()
    );

    let (mut sender, mut receiver) = socket.split();

    let writer_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("[WS] SERIALIZE_ERROR connection_id={} error={}", writer_id, e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json.into())).await {
                warn!("[WS] SEND_ERROR connection_id={} error={}", writer_id, e);
                break;
            }
            debug!("[WS] FRAME_SENT connection_id={} type={}", writer_id, frame.kind());
        }
    });

    // Stops the reader between frames; a frame being handled always runs to the end.
    let stop_reading = shutdown.child_token();
    let reader_stop = stop_reading.clone();
    let reader_gateway = gateway.clone();
    let reader_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = reader_stop.cancelled() => {
                    info!("[WS] READER_STOPPED connection_id={}", reader_handle.id());
                    break;
                }
                msg = receiver.next() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            match msg {
                Ok(Message::Text(text)) => {
                    reader_gateway.handle_frame(&reader_handle, text.as_str().as_bytes()).await;
                }
                Ok(Message::Binary(data)) => {
                    reader_gateway.handle_frame(&reader_handle, &data).await;
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.code.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    info!("[WS] CLOSE_RECEIVED connection_id={} code={}", reader_handle.id(), reason);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    warn!("[WS] RECV_ERROR connection_id={} error={}", reader_handle.id(), e);
                    break;
                }
            }
        }
    });

    // Shutdown reaches the reader through `stop_reading`; the writer keeps draining
    // until the reader is done.
    tokio::select! {
        result = &mut send_task => {
            stop_reading.cancel();
            if let Err(e) = result {
                error!("[WS] SEND_TASK_ERROR connection_id={} error={:?}", connection_id, e);
            }
            if let Err(e) = recv_task.await {
                error!("[WS] RECV_TASK_ERROR connection_id={} error={:?}", connection_id, e);
            }
        }
        result = &mut recv_task => {
            send_task.abort();
            if let Err(e) = result {
                error!("[WS] RECV_TASK_ERROR connection_id={} error={:?}", connection_id, e);
            }
        }
    }

    if shutdown.is_cancelled() {
        info!("[WS] SHUTDOWN connection_id={}", connection_id);
    }

    let purged = gateway.registry().unregister(&connection_id).await;
    info!(
        "[WS] DISCONNECTED connection_id={} duration={:.2}s purged_tasks={}",
        connection_id,
        connection_start.elapsed().as_secs_f64(),
        purged
    );
}
