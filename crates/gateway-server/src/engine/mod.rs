//! Relay engine.
//!
//! One task owns every upstream socket handle, every per-location snapshot
//! and the client registry. Upstream readers, reconnect timers and client
//! sessions talk to it only through [`EngineEvent`]s on a single bounded
//! queue, so each event is handled to completion before the next one and no
//! locking is needed.

pub mod broadcast;
pub mod clients;
pub mod upstream;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::protocol::{LocationView, initial_state, parse_state};
use gateway_core::{CoreError, Location, LocationRegistry, StateSnapshot};
use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use self::broadcast::BroadcastRouter;
use self::clients::{ClientConnection, ClientId, ClientRegistry, should_log_client_count};
use self::upstream::{
    UpstreamConnector, UpstreamEvent, UpstreamHandle, UpstreamSink, UpstreamStatus,
};
use crate::config::EngineConfig;
use crate::metrics::{
    CLIENT_CONNECTIONS_TOTAL, CLIENT_DISCONNECTIONS_TOTAL, CLIENT_REJECTIONS_TOTAL,
    CLIENTS_ACTIVE, UPSTREAM_CONNECTED, UPSTREAM_CONNECTS_TOTAL, UPSTREAM_DISCONNECTS_TOTAL,
    UPSTREAM_MESSAGES_TOTAL, UPSTREAM_PARSE_ERRORS_TOTAL,
};

/// Capacity of the engine's event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Close code sent to clients on shutdown ("going away").
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close reason sent to clients on shutdown.
pub const SHUTDOWN_REASON: &str = "Gateway shutting down";

/// Errors returned through an [`EngineHandle`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has exited.
    #[error("relay engine is not running")]
    Stopped,
    /// The subscription named locations that are not configured.
    #[error(transparent)]
    Rejected(#[from] CoreError),
}

/// Input to the engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// Something happened on an upstream socket.
    Upstream {
        /// Location the socket belongs to.
        location: String,
        /// Generation of the socket that produced the event.
        generation: u64,
        /// What happened.
        event: UpstreamEvent,
    },
    /// A reconnect timer fired.
    ReconnectDue {
        /// Location to reconnect.
        location: String,
    },
    /// A client wants to subscribe.
    ClientConnect {
        /// The new client.
        client: ClientConnection,
        /// Accept or reject.
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// A client socket closed.
    ClientClosed {
        /// The departed client.
        client_id: ClientId,
    },
    /// Report engine status.
    Status {
        /// Status reply.
        reply: oneshot::Sender<EngineStatus>,
    },
    /// Close every client and upstream, then stop.
    Shutdown {
        /// Signalled once everything is closed.
        reply: oneshot::Sender<()>,
    },
}

/// Whether the event loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep handling events.
    Continue,
    /// Exit the loop.
    Stop,
}

/// Point-in-time view of the engine, served by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Registered clients.
    pub clients: usize,
    /// Every configured location, sorted by name.
    pub locations: Vec<LocationStatus>,
}

/// Status of one location.
#[derive(Debug, Clone, Serialize)]
pub struct LocationStatus {
    /// Location name.
    pub name: String,
    /// Upstream socket status.
    pub status: UpstreamStatus,
    /// Whether the upstream socket is open.
    pub connected: bool,
    /// Subscribed clients.
    pub subscribers: usize,
    /// Keys in the accumulated snapshot.
    pub snapshot_keys: usize,
    /// Whether a reconnect timer is pending.
    pub reconnect_pending: bool,
}

// ── Per-location state ──────────────────────────────────────────────────────

struct LocationState {
    location: Location,
    status: UpstreamStatus,
    generation: u64,
    socket: Option<UpstreamHandle>,
    pending_reconnect: Option<AbortHandle>,
    snapshot: StateSnapshot,
}

impl LocationState {
    fn new(location: Location) -> Self {
        Self {
            location,
            status: UpstreamStatus::Disconnected,
            generation: 0,
            socket: None,
            pending_reconnect: None,
            snapshot: StateSnapshot::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.status == UpstreamStatus::Open
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.pending_reconnect.take() {
            timer.abort();
        }
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }

    fn set_status(&mut self, status: UpstreamStatus) {
        self.status = status;
        let up = if status == UpstreamStatus::Open { 1.0 } else { 0.0 };
        gauge!(UPSTREAM_CONNECTED, "location" => self.location.name.clone()).set(up);
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Owner of all relay state. Driven by [`RelayEngine::run`].
pub struct RelayEngine {
    registry: LocationRegistry,
    locations: BTreeMap<String, LocationState>,
    clients: ClientRegistry,
    router: BroadcastRouter,
    connector: Arc<dyn UpstreamConnector>,
    reconnect_delay: Duration,
    events: mpsc::Sender<EngineEvent>,
}

impl RelayEngine {
    /// Create an engine; `events` is the sending side of its own queue.
    pub fn new(
        registry: LocationRegistry,
        connector: Arc<dyn UpstreamConnector>,
        config: &EngineConfig,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let locations = registry
            .iter()
            .map(|loc| (loc.name.clone(), LocationState::new(loc.clone())))
            .collect();
        Self {
            registry,
            locations,
            clients: ClientRegistry::new(),
            router: BroadcastRouter::new(config.broadcast_log_threshold),
            connector,
            reconnect_delay: config.reconnect_delay(),
            events,
        }
    }

    /// Open every configured upstream.
    pub fn connect_all(&mut self) {
        let names: Vec<String> = self.locations.keys().cloned().collect();
        for name in names {
            self.connect(&name);
        }
    }

    /// Open the upstream for `name` unless one is open or connecting.
    pub fn connect(&mut self, name: &str) {
        let Some(state) = self.locations.get_mut(name) else {
            return;
        };
        if matches!(
            state.status,
            UpstreamStatus::Open | UpstreamStatus::Connecting
        ) {
            return;
        }
        if state.socket.is_some() {
            state.close_socket();
            state.snapshot.clear();
        }
        state.generation += 1;
        state.set_status(UpstreamStatus::Connecting);
        debug!(
            location = name,
            generation = state.generation,
            url = %state.location.upstream_url,
            "connecting upstream"
        );
        let sink = UpstreamSink::new(name.to_owned(), state.generation, self.events.clone());
        state.socket = Some(self.connector.open(&state.location, sink));
    }

    /// Handle one event.
    pub fn handle(&mut self, event: EngineEvent) -> Flow {
        match event {
            EngineEvent::Upstream {
                location,
                generation,
                event,
            } => self.on_upstream(&location, generation, event),
            EngineEvent::ReconnectDue { location } => {
                if let Some(state) = self.locations.get_mut(&location) {
                    state.pending_reconnect = None;
                }
                self.connect(&location);
            }
            EngineEvent::ClientConnect { client, reply } => {
                let result = self.on_client_connect(client);
                let _ = reply.send(result);
            }
            EngineEvent::ClientClosed { client_id } => self.on_client_closed(&client_id),
            EngineEvent::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineEvent::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Run the event loop until shutdown or until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event) == Flow::Stop {
                break;
            }
        }
        debug!("relay engine stopped");
    }

    /// Current status of every location.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            clients: self.clients.len(),
            locations: self
                .locations
                .values()
                .map(|state| LocationStatus {
                    name: state.location.name.clone(),
                    status: state.status,
                    connected: state.is_open(),
                    subscribers: self.clients.subscriber_count(&state.location.name),
                    snapshot_keys: state.snapshot.len(),
                    reconnect_pending: state.pending_reconnect.is_some(),
                })
                .collect(),
        }
    }

    /// Accumulated snapshot for `name`.
    pub fn snapshot(&self, name: &str) -> Option<&StateSnapshot> {
        self.locations.get(name).map(|state| &state.snapshot)
    }

    // ── Upstream events ─────────────────────────────────────────────────

    fn on_upstream(&mut self, name: &str, generation: u64, event: UpstreamEvent) {
        let Some(state) = self.locations.get_mut(name) else {
            return;
        };
        if generation != state.generation {
            debug!(
                location = name,
                generation,
                current = state.generation,
                "ignoring stale upstream event"
            );
            return;
        }

        match event {
            UpstreamEvent::Opened { registered_paths } => {
                state.set_status(UpstreamStatus::Open);
                state.cancel_reconnect();
                counter!(UPSTREAM_CONNECTS_TOTAL, "location" => name.to_owned()).increment(1);
                info!(location = name, registered_paths, "upstream connected");
            }
            UpstreamEvent::Message(raw) => self.on_upstream_message(name, &raw),
            UpstreamEvent::Failed(error) => {
                state.set_status(UpstreamStatus::Disconnected);
                warn!(location = name, error = %error, "upstream error");
            }
            UpstreamEvent::Closed => {
                state.set_status(UpstreamStatus::Disconnected);
                state.socket = None;
                state.snapshot.clear();
                counter!(UPSTREAM_DISCONNECTS_TOTAL, "location" => name.to_owned()).increment(1);
                info!(location = name, "upstream disconnected");
                self.schedule_reconnect(name);
            }
        }
    }

    fn on_upstream_message(&mut self, name: &str, raw: &Arc<str>) {
        counter!(UPSTREAM_MESSAGES_TOTAL, "location" => name.to_owned()).increment(1);
        let delta = match parse_state(raw) {
            Ok(delta) => delta,
            Err(err) => {
                counter!(UPSTREAM_PARSE_ERRORS_TOTAL, "location" => name.to_owned()).increment(1);
                warn!(location = name, error = %err, "unparsable upstream message, relaying raw");
                None
            }
        };
        if let (Some(delta), Some(state)) = (&delta, self.locations.get_mut(name)) {
            state.snapshot.merge(delta);
        }
        let _ = self
            .router
            .route(&mut self.clients, name, raw, delta.as_ref());
        set_clients_active(self.clients.len());
    }

    fn schedule_reconnect(&mut self, name: &str) {
        let Some(state) = self.locations.get_mut(name) else {
            return;
        };
        if state.pending_reconnect.is_some() {
            return;
        }
        let events = self.events.clone();
        let location = name.to_owned();
        let delay = self.reconnect_delay;
        let deadline = tokio::time::Instant::now() + delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(EngineEvent::ReconnectDue { location }).await;
        });
        state.pending_reconnect = Some(timer.abort_handle());
        debug!(location = name, delay_ms = delay.as_millis(), "reconnect scheduled");
    }

    // ── Client events ───────────────────────────────────────────────────

    fn on_client_connect(&mut self, client: ClientConnection) -> Result<(), CoreError> {
        if let Err(err) = self.registry.validate(client.locations()) {
            counter!(CLIENT_REJECTIONS_TOTAL).increment(1);
            info!(client_id = %client.id, error = %err, "subscription rejected");
            return Err(err);
        }

        let id = client.id.clone();
        let requested = client.locations().to_vec();
        self.clients.register(client);
        for name in &requested {
            self.connect(name);
        }

        let views: Vec<LocationView<'_>> = requested
            .iter()
            .filter_map(|name| self.locations.get(name))
            .map(|state| LocationView {
                name: &state.location.name,
                connected: state.is_open(),
                snapshot: &state.snapshot,
            })
            .collect();
        let delivered = match serde_json::to_string(&initial_state(&views)) {
            Ok(json) => self
                .clients
                .get(&id)
                .is_some_and(|client| client.send(Arc::from(json))),
            Err(err) => {
                warn!(client_id = %id, error = %err, "failed to serialize initial state");
                false
            }
        };
        if !delivered {
            let _ = self.clients.remove(&id);
            warn!(client_id = %id, "initial state could not be queued, dropping client");
            return Ok(());
        }

        let total = self.clients.len();
        counter!(CLIENT_CONNECTIONS_TOTAL).increment(1);
        set_clients_active(total);
        if should_log_client_count(total) {
            info!(client_id = %id, locations = ?requested, total, "client connected");
        }
        Ok(())
    }

    fn on_client_closed(&mut self, id: &ClientId) {
        let removed = self.clients.remove(id).is_some();
        let total = self.clients.len();
        counter!(CLIENT_DISCONNECTIONS_TOTAL).increment(1);
        set_clients_active(total);
        if should_log_client_count(total) {
            info!(client_id = %id, removed, total, "client disconnected");
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    fn shutdown(&mut self) {
        let clients = self.clients.drain();
        for client in &clients {
            let _ = client.close(CLOSE_GOING_AWAY, SHUTDOWN_REASON);
        }
        for state in self.locations.values_mut() {
            state.cancel_reconnect();
            state.close_socket();
            state.set_status(UpstreamStatus::Disconnected);
            state.snapshot.clear();
        }
        set_clients_active(0);
        info!(clients = clients.len(), "relay engine shut down");
    }
}

#[allow(clippy::cast_precision_loss)]
fn set_clients_active(total: usize) {
    gauge!(CLIENTS_ACTIVE).set(total as f64);
}

// ── Handle ──────────────────────────────────────────────────────────────────

/// Cloneable handle for talking to a running engine.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Wrap the sending side of an engine's queue.
    pub fn new(events: mpsc::Sender<EngineEvent>) -> Self {
        Self { events }
    }

    /// Register a client. On success its initial state is already queued.
    pub async fn subscribe(&self, client: ClientConnection) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::ClientConnect { client, reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)?.map_err(EngineError::from)
    }

    /// Tell the engine a client socket closed.
    pub async fn unsubscribe(&self, client_id: ClientId) {
        let _ = self.send(EngineEvent::ClientClosed { client_id }).await;
    }

    /// Current engine status.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Close every client and upstream, then stop the engine.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineEvent::Shutdown { reply }).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    async fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.events.send(event).await.map_err(|_| EngineError::Stopped)
    }
}

/// Start the engine task.
///
/// With `eager_connect` every upstream is opened immediately; otherwise each
/// one opens on its first subscriber.
pub fn spawn_engine(
    registry: LocationRegistry,
    connector: Arc<dyn UpstreamConnector>,
    config: &EngineConfig,
) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let mut engine = RelayEngine::new(registry, connector, config, tx.clone());
    info!(
        locations = ?engine.registry.names(),
        eager = config.eager_connect,
        "relay engine starting"
    );
    if config.eager_connect {
        engine.connect_all();
    }
    let task = tokio::spawn(engine.run(rx));
    (EngineHandle::new(tx), task)
}
