//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file is valid and missing fields keep their default value.

use std::collections::BTreeMap;

use gateway_core::protocol::default_register_paths;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the gateway.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "upstream": {
///     "locations": { "north": "ws://10.0.0.2:8000/WS/", "south": "ws://10.0.0.3:8000/WS/" }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Client-facing server settings.
    pub server: ServerSettings,
    /// Upstream scoreboard settings.
    pub upstream: UpstreamSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Reject values that would make the gateway misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, reason: &'static str| -> Result<()> {
            Err(SettingsError::Invalid { field, reason })
        };
        if self.server.heartbeat_interval_secs == 0 {
            return invalid("server.heartbeatIntervalSecs", "must be greater than 0");
        }
        if self.server.pong_timeout_secs < self.server.heartbeat_interval_secs {
            return invalid(
                "server.pongTimeoutSecs",
                "must be at least server.heartbeatIntervalSecs",
            );
        }
        if self.server.client_queue_capacity == 0 {
            return invalid("server.clientQueueCapacity", "must be greater than 0");
        }
        if self.upstream.reconnect_delay_ms == 0 {
            return invalid("upstream.reconnectDelayMs", "must be greater than 0");
        }
        Ok(())
    }
}

/// Client-facing HTTP/WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Interval between server Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for this long, in seconds.
    pub pong_timeout_secs: u64,
    /// Per-client outbound queue length; a full queue drops the client.
    pub client_queue_capacity: usize,
    /// Largest inbound client frame accepted, in bytes.
    pub max_message_size: usize,
    /// Log broadcasts only above this many subscribers.
    pub broadcast_log_threshold: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_secs: 30,
            pong_timeout_secs: 90,
            client_queue_capacity: 256,
            max_message_size: 1024 * 1024,
            broadcast_log_threshold: 100,
        }
    }
}

/// Upstream scoreboard settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Named upstream addresses (location name → WebSocket URL).
    pub locations: BTreeMap<String, String>,
    /// Legacy single upstream, used as location `default` when `locations`
    /// is empty.
    pub scoreboard_url: String,
    /// Delay before reconnecting after an upstream closes, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Connect every location at startup instead of on first subscription.
    pub eager_connect: bool,
    /// State paths registered with each upstream.
    pub register_paths: Vec<String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            locations: BTreeMap::new(),
            scoreboard_url: "ws://192.168.1.144:8000/WS/".to_string(),
            reconnect_delay_ms: 1000,
            eager_connect: true,
            register_paths: default_register_paths(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
