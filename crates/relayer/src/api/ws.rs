//! WebSocket subscription endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::registry::{ConnectionId, ConnectionRegistry};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> axum::response::Response {
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Deregisters the connection when dropped, whichever way the socket task ends.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Bound on the farewell Close frame so a stalled peer cannot hold the task open.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Register the socket, forward broadcasts to it, and block until the peer goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (outbox, frames) = mpsc::channel(state.config.outbox_capacity);
    // Cancelled on eviction, removal, or process shutdown.
    let closed = state.shutdown.child_token();
    let registration = Registration {
        id: state.registry.add(outbox, closed.clone()),
        registry: state.registry.clone(),
    };
    let (mut ws_tx, ws_rx) = socket.split();

    let say_goodbye = tokio::select! {
        biased;
        _ = closed.cancelled() => true,
        _ = read_until_done(ws_rx) => false,
        _ = write_frames(&mut ws_tx, frames, &closed, state.config.ping_interval) => false,
    };

    if say_goodbye {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(Message::Close(None))).await;
    }
    tracing::debug!(conn = %registration.id, "socket task finished");
    drop(registration);
}

/// Subscribers send nothing; any data frame, close, or error ends the connection.
async fn read_until_done(mut ws_rx: SplitStream<WebSocket>) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(_) => break,
            Err(e) => {
                tracing::debug!(error = %e, "websocket read error");
                break;
            }
        }
    }
}

/// Drain the outbox into the socket.
///
/// Returns when a write fails or the connection has been closed by the registry.
/// Frames still queued at that point are dropped, never written.
async fn write_frames(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Utf8Bytes>,
    closed: &CancellationToken,
    ping_interval: Option<Duration>,
) {
    // Ping is disabled by parking its tick forever.
    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval
    });

    loop {
        let msg = tokio::select! {
            biased;
            _ = closed.cancelled() => return,
            frame = frames.recv() => match frame {
                Some(text) => Message::Text(text),
                None => return,
            },
            _ = async {
                match ping.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => Message::Ping(axum::body::Bytes::new()),
        };
        // Eviction may land between dequeue and write.
        if closed.is_cancelled() {
            return;
        }
        if let Err(e) = ws_tx.send(msg).await {
            tracing::debug!(error = %e, "websocket write failed");
            return;
        }
    }
}
