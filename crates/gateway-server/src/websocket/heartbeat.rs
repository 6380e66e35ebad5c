//! Client liveness tracking for server-initiated pings.

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

/// When a client was last heard from.
///
/// The reader marks every inbound frame; the writer checks the elapsed time
/// on each ping tick.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    /// Start tracking from now.
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record activity (pong or any other frame).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Whether the client has been silent longer than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
