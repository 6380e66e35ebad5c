//! WebSocket session lifecycle. Handles a single viewer from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::heartbeat::Liveness;
use crate::config::ServerConfig;
use crate::engine::clients::{ClientConnection, ClientId, Outbound};
use crate::engine::{CLOSE_GOING_AWAY, EngineError, EngineHandle, SHUTDOWN_REASON};

/// Close code for a subscription to unknown locations.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Longest close reason a WebSocket close frame can carry, in bytes.
const MAX_CLOSE_REASON: usize = 123;

/// Per-session settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Drop a client silent for this long.
    pub pong_timeout: Duration,
    /// Outbound queue length.
    pub queue_capacity: usize,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            pong_timeout: config.pong_timeout(),
            queue_capacity: config.client_queue_capacity.max(1),
        }
    }
}

/// Cut `reason` to the close-frame limit without splitting a character.
pub fn truncate_close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: truncate_close_reason(reason).to_owned().into(),
    }))
}

/// Run a WebSocket session for a viewer subscribed to `locations`.
///
/// 1. Subscribes with the engine; an unknown location closes the socket
///    with 1008 and nothing is registered
/// 2. Forwards queued frames (initial state first) to the socket
/// 3. Sends periodic Ping frames and drops clients silent past the timeout
/// 4. Ignores inbound data; viewers are read-only
/// 5. Unsubscribes on disconnect
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_client_session(
    ws: WebSocket,
    client_id: ClientId,
    locations: Vec<String>,
    engine: EngineHandle,
    config: SessionConfig,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Outbound>(config.queue_capacity);
    let connection = ClientConnection::new(client_id.clone(), locations, send_tx);

    match engine.subscribe(connection).await {
        Ok(()) => {}
        Err(EngineError::Rejected(err)) => {
            debug!(error = %err, "subscription rejected, closing");
            let _ = ws_tx
                .send(close_message(CLOSE_POLICY_VIOLATION, &err.to_string()))
                .await;
            return;
        }
        Err(EngineError::Stopped) => {
            let _ = ws_tx
                .send(close_message(CLOSE_GOING_AWAY, SHUTDOWN_REASON))
                .await;
            return;
        }
    }

    // Outbound forwarder with periodic Ping frames.
    let liveness = Arc::new(Liveness::new());
    let writer_liveness = Arc::clone(&liveness);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => match frame {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = ws_tx.send(close_message(code, &reason)).await;
                        break;
                    }
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if writer_liveness.is_expired(config.pong_timeout) {
                        warn!("client unresponsive for {:?}, disconnecting", config.pong_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) => {
                    debug!("client sent close frame");
                    break;
                }
                Some(Ok(_)) => liveness.mark_alive(),
                Some(Err(err)) => {
                    debug!(error = %err, "client socket error");
                    break;
                }
                None => break,
            },
        }
    }

    writer.abort();
    engine.unsubscribe(client_id).await;
}
