//! # scoreboard-gateway
//!
//! Relays live scoreboard state from one or more upstream scoreboards to
//! many WebSocket viewers. Wires settings, logging, metrics, the relay engine
//! and the HTTP server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::LocationRegistry;
use gateway_server::engine::upstream::WsUpstreamConnector;
use gateway_server::{EngineConfig, GatewayServer, ServerConfig, spawn_engine};
use gateway_settings::GatewaySettings;

/// How long shutdown waits for the listener and engine to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Scoreboard WebSocket gateway.
#[derive(Parser, Debug)]
#[command(name = "scoreboard-gateway", about = "Scoreboard WebSocket gateway")]
struct Cli {
    /// Settings file (default `~/.scoreboard-gateway/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. `info` or `gateway_server=debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Apply command-line overrides on top of file and env settings.
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn server_config(settings: &GatewaySettings) -> ServerConfig {
    ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
        pong_timeout_secs: settings.server.pong_timeout_secs,
        client_queue_capacity: settings.server.client_queue_capacity,
        max_message_size: settings.server.max_message_size,
    }
}

fn engine_config(settings: &GatewaySettings) -> EngineConfig {
    EngineConfig {
        reconnect_delay_ms: settings.upstream.reconnect_delay_ms,
        eager_connect: settings.upstream.eager_connect,
        register_paths: settings.upstream.register_paths.clone(),
        broadcast_log_threshold: settings.server.broadcast_log_threshold,
    }
}

/// Named locations win; the legacy url is only used when none are named.
fn location_registry(settings: &GatewaySettings) -> Result<LocationRegistry> {
    LocationRegistry::from_config(
        &settings.upstream.locations,
        Some(settings.upstream.scoreboard_url.as_str()),
    )
    .context("Invalid upstream location configuration")
}

fn load(cli: &Cli) -> Result<GatewaySettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(gateway_settings::settings_path);
    let mut settings = gateway_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    if settings.logging.json {
        gateway_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        gateway_core::logging::init_subscriber(&settings.logging.level);
    }

    let registry = location_registry(&settings)?;
    tracing::info!(locations = ?registry.names(), "upstream locations configured");

    let metrics = gateway_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let engine_config = engine_config(&settings);
    let connector = Arc::new(WsUpstreamConnector::new(engine_config.register_paths.clone()));
    let (engine, engine_task) = spawn_engine(registry, connector, &engine_config);

    let server = GatewayServer::new(server_config(&settings), engine.clone(), metrics);
    let (addr, serve_task) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("Scoreboard gateway listening on ws://{addr}");

    wait_for_signal().await?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(&engine, vec![serve_task, engine_task], Some(SHUTDOWN_TIMEOUT))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_are_empty() {
        let cli = Cli::parse_from(["scoreboard-gateway"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn cli_custom_port_and_host() {
        let cli = Cli::parse_from(["scoreboard-gateway", "--port", "9000", "--host", "127.0.0.1"]);
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["scoreboard-gateway", "--config", "/tmp/gw.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gw.json")));
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "scoreboard-gateway",
            "--port",
            "9100",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let mut settings = GatewaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn legacy_url_used_without_named_locations() {
        let registry = location_registry(&GatewaySettings::default()).unwrap();
        assert_eq!(registry.names(), vec!["default"]);
        assert_eq!(
            registry.get("default").unwrap().upstream_url,
            "ws://192.168.1.144:8000/WS/"
        );
    }

    #[test]
    fn named_locations_replace_legacy() {
        let mut settings = GatewaySettings::default();
        let _ = settings
            .upstream
            .locations
            .insert("North".into(), "ws://n/WS/".into());
        let registry = location_registry(&settings).unwrap();
        assert_eq!(registry.names(), vec!["north"]);
    }

    #[test]
    fn empty_configuration_is_an_error() {
        let mut settings = GatewaySettings::default();
        settings.upstream.scoreboard_url.clear();
        assert!(location_registry(&settings).is_err());
    }

    #[test]
    fn configs_follow_settings() {
        let mut settings = GatewaySettings::default();
        settings.server.client_queue_capacity = 32;
        settings.upstream.reconnect_delay_ms = 250;
        settings.upstream.eager_connect = false;
        assert_eq!(server_config(&settings).client_queue_capacity, 32);
        let engine = engine_config(&settings);
        assert_eq!(engine.reconnect_delay(), Duration::from_millis(250));
        assert!(!engine.eager_connect);
        assert_eq!(engine.register_paths.len(), 10);
    }

    #[test]
    fn load_reads_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9300},"upstream":{"locations":{"rink":"ws://rink/WS/"}}}"#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "scoreboard-gateway",
            "--config",
            path.to_str().unwrap(),
            "--host",
            "127.0.0.1",
        ]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.server.port, 9300);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(location_registry(&settings).unwrap().names(), vec!["rink"]);
    }
}
