//! Server and engine configuration.

use std::time::Duration;

use gateway_core::protocol::default_register_paths;
use serde::{Deserialize, Serialize};

/// Configuration for the client-facing server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client that has been silent this long, in seconds.
    pub pong_timeout_secs: u64,
    /// Outbound queue length per client.
    pub client_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 30,
            pong_timeout_secs: 90,
            client_queue_capacity: 256,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Configuration for the relay engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before reconnecting a closed upstream, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Open every upstream at startup.
    pub eager_connect: bool,
    /// State paths sent in each upstream registration request.
    pub register_paths: Vec<String>,
    /// Broadcasts to more subscribers than this are logged.
    pub broadcast_log_threshold: usize,
}

impl EngineConfig {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            eager_connect: true,
            register_paths: default_register_paths(),
            broadcast_log_threshold: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn heartbeat_durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.pong_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn default_reconnect_delay_is_one_second() {
        assert_eq!(
            EngineConfig::default().reconnect_delay(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn default_engine_registers_all_paths() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.register_paths.len(), 10);
        assert!(cfg.eager_connect);
        assert_eq!(cfg.broadcast_log_threshold, 100);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            port: 8080,
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, 8080);
        assert_eq!(back.client_queue_capacity, 256);
    }
}
