//! Client connections and the location → subscriber index.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Fresh `client_<uuid v7>` id.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame queued for a client's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text payload, shared between every recipient of a broadcast.
    Text(Arc<str>),
    /// Close the socket with this code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// A subscribed viewer, as seen by the relay engine.
///
/// Holds the sending half of the client's bounded outbound queue; dropping
/// the connection ends the client's writer task.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ClientId,
    locations: Vec<String>,
    tx: mpsc::Sender<Outbound>,
}

impl ClientConnection {
    /// Create a connection subscribed to `locations`.
    ///
    /// Repeated names are dropped; the first occurrence keeps its position.
    pub fn new(id: ClientId, mut locations: Vec<String>, tx: mpsc::Sender<Outbound>) -> Self {
        let mut seen = HashSet::new();
        locations.retain(|name| seen.insert(name.clone()));
        Self { id, locations, tx }
    }

    /// Subscribed location names, in request order.
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    /// Whether this client receives re-keyed payloads.
    pub fn is_multi_location(&self) -> bool {
        self.locations.len() > 1
    }

    /// Whether the writer side is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame without blocking.
    ///
    /// Returns `false` if the queue is full or closed.
    pub fn send(&self, payload: Arc<str>) -> bool {
        self.tx.try_send(Outbound::Text(payload)).is_ok()
    }

    /// Queue a close frame without blocking.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.tx
            .try_send(Outbound::Close {
                code,
                reason: reason.to_owned(),
            })
            .is_ok()
    }
}

/// Registered clients, indexed by id and by subscribed location.
///
/// A client id appears under a location iff that location is in the client's
/// subscription list. Empty location sets are pruned.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientConnection>,
    by_location: HashMap<String, HashSet<ClientId>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under each of its locations.
    pub fn register(&mut self, client: ClientConnection) {
        for location in client.locations() {
            let _ = self
                .by_location
                .entry(location.clone())
                .or_default()
                .insert(client.id.clone());
        }
        let _ = self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client from every location it subscribed to.
    pub fn remove(&mut self, id: &ClientId) -> Option<ClientConnection> {
        let client = self.clients.remove(id)?;
        for location in client.locations() {
            if let Some(set) = self.by_location.get_mut(location) {
                let _ = set.remove(id);
                if set.is_empty() {
                    let _ = self.by_location.remove(location);
                }
            }
        }
        Some(client)
    }

    /// Look up a client.
    pub fn get(&self, id: &ClientId) -> Option<&ClientConnection> {
        self.clients.get(id)
    }

    /// Copy of the subscriber ids for `location`.
    pub fn subscribers(&self, location: &str) -> Vec<ClientId> {
        self.by_location
            .get(location)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers for `location`.
    pub fn subscriber_count(&self, location: &str) -> usize {
        self.by_location.get(location).map_or(0, HashSet::len)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Remove and return every client.
    pub fn drain(&mut self) -> Vec<ClientConnection> {
        self.by_location.clear();
        self.clients.drain().map(|(_, client)| client).collect()
    }
}

/// Connect/disconnect logging is throttled once the audience gets large.
pub fn should_log_client_count(total: usize) -> bool {
    total <= 100 || total % 100 == 0
}
