//! Per-location accumulated state.

use serde_json::{Map, Value};

use crate::keys::location_key;

/// Last-write-wins accumulation of upstream state deltas.
///
/// Keys are never removed one at a time; the whole snapshot is emptied when
/// the upstream link drops, so stale state is never served.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    state: Map<String, Value>,
}

impl StateSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delta: each key in `delta` overwrites the stored value.
    pub fn merge(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            let _ = self.state.insert(key.clone(), value.clone());
        }
    }

    /// Drop all accumulated state.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether no state has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Look up a single key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Borrow the raw key/value map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Insert every key into `out`, prefixed with `Location(<location>).`.
    pub fn extend_prefixed(&self, location: &str, out: &mut Map<String, Value>) {
        for (key, value) in &self.state {
            let _ = out.insert(location_key(location, key), value.clone());
        }
    }
}
