//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::engine::{EngineStatus, LocationStatus};

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the relay engine runs, `"stopping"` after it exits.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered viewer count.
    pub connections: usize,
    /// Per-location upstream status.
    pub locations: Vec<LocationStatus>,
}

impl HealthResponse {
    /// Whether the engine is running.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response from the engine's status, if it answered.
pub fn health_check(start_time: Instant, engine: Option<EngineStatus>) -> HealthResponse {
    let uptime_secs = start_time.elapsed().as_secs();
    match engine {
        Some(status) => HealthResponse {
            status: "ok".into(),
            uptime_secs,
            connections: status.clients,
            locations: status.locations,
        },
        None => HealthResponse {
            status: "stopping".into(),
            uptime_secs,
            connections: 0,
            locations: Vec::new(),
        },
    }
}
