//! Upstream scoreboard sockets.
//!
//! The engine never touches a socket directly. It asks an
//! [`UpstreamConnector`] to open one and receives everything that happens on
//! it as [`UpstreamEvent`]s through an [`UpstreamSink`], tagged with the
//! socket's generation so events from a replaced socket can be discarded.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use gateway_core::Location;
use gateway_core::protocol::RegisterRequest;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::EngineEvent;

/// Upstream socket status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    /// No socket, or the last one closed.
    #[default]
    Disconnected,
    /// Socket requested, handshake not finished.
    Connecting,
    /// Registered and receiving deltas.
    Open,
}

/// Something that happened on an upstream socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Handshake done and registration sent.
    Opened {
        /// Number of state paths registered.
        registered_paths: usize,
    },
    /// A text payload, exactly as received.
    Message(Arc<str>),
    /// Connect or transport error. Always followed by [`UpstreamEvent::Closed`].
    Failed(String),
    /// The socket is gone.
    Closed,
}

/// Channel back into the engine for one socket attempt.
#[derive(Clone, Debug)]
pub struct UpstreamSink {
    location: String,
    generation: u64,
    events: mpsc::Sender<EngineEvent>,
}

impl UpstreamSink {
    /// Sink tagging events with `location` and `generation`.
    pub fn new(location: String, generation: u64, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            location,
            generation,
            events,
        }
    }

    /// Location this sink reports for.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Socket generation this sink reports for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward an event to the engine. Returns `false` once the engine is gone.
    pub async fn emit(&self, event: UpstreamEvent) -> bool {
        self.events
            .send(EngineEvent::Upstream {
                location: self.location.clone(),
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// Owner's handle on a running upstream socket.
#[derive(Debug)]
pub struct UpstreamHandle {
    cancel: CancellationToken,
}

impl UpstreamHandle {
    /// Handle that closes the socket when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Close the socket. No [`UpstreamEvent::Closed`] is reported for it.
    pub fn close(self) {
        self.cancel.cancel();
    }
}

/// Opens upstream sockets.
pub trait UpstreamConnector: Send + Sync + 'static {
    /// Start connecting to `location`, reporting through `sink`.
    fn open(&self, location: &Location, sink: UpstreamSink) -> UpstreamHandle;
}

/// Connector for real scoreboard WebSocket servers.
#[derive(Clone, Debug)]
pub struct WsUpstreamConnector {
    register_paths: Arc<[String]>,
}

impl WsUpstreamConnector {
    /// Connector that registers `register_paths` on every socket.
    pub fn new(register_paths: Vec<String>) -> Self {
        Self {
            register_paths: register_paths.into(),
        }
    }
}

impl UpstreamConnector for WsUpstreamConnector {
    fn open(&self, location: &Location, sink: UpstreamSink) -> UpstreamHandle {
        let cancel = CancellationToken::new();
        let span = info_span!(
            "upstream",
            location = %location.name,
            generation = sink.generation()
        );
        let _ = tokio::spawn(
            run_upstream(
                location.upstream_url.clone(),
                Arc::clone(&self.register_paths),
                sink,
                cancel.clone(),
            )
            .instrument(span),
        );
        UpstreamHandle::new(cancel)
    }
}

/// Drive one upstream socket until it closes or is cancelled.
async fn run_upstream(
    url: String,
    register_paths: Arc<[String]>,
    sink: UpstreamSink,
    cancel: CancellationToken,
) {
    debug!(url, "connecting to upstream");
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };
    let mut ws = match connected {
        Ok((ws, _response)) => ws,
        Err(err) => {
            let _ = sink.emit(UpstreamEvent::Failed(err.to_string())).await;
            let _ = sink.emit(UpstreamEvent::Closed).await;
            return;
        }
    };

    let register = match RegisterRequest::new(&register_paths).to_json() {
        Ok(json) => json,
        Err(err) => {
            let _ = sink.emit(UpstreamEvent::Failed(err.to_string())).await;
            let _ = sink.emit(UpstreamEvent::Closed).await;
            return;
        }
    };
    if let Err(err) = ws.send(Message::Text(register.into())).await {
        let _ = sink.emit(UpstreamEvent::Failed(err.to_string())).await;
        let _ = sink.emit(UpstreamEvent::Closed).await;
        return;
    }
    let opened = UpstreamEvent::Opened {
        registered_paths: register_paths.len(),
    };
    if !sink.emit(opened).await {
        return;
    }

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            frame = ws.next() => frame,
        };

        let event = match frame {
            Some(Ok(Message::Text(text))) => UpstreamEvent::Message(Arc::from(text.as_str())),
            Some(Ok(Message::Binary(data))) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    UpstreamEvent::Message(Arc::from(text))
                } else {
                    warn!(len = data.len(), "dropping non-UTF8 binary frame from upstream");
                    continue;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "upstream sent close frame");
                UpstreamEvent::Closed
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                let _ = sink.emit(UpstreamEvent::Failed(err.to_string())).await;
                UpstreamEvent::Closed
            }
            None => UpstreamEvent::Closed,
        };

        let closed = event == UpstreamEvent::Closed;
        if !sink.emit(event).await || closed {
            return;
        }
    }
}
