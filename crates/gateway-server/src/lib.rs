//! # gateway-server
//!
//! Relay engine and Axum HTTP + WebSocket server for the scoreboard gateway.
//!
//! - [`engine`]: the single task that owns upstream sockets, snapshots and
//!   the client registry, plus the broadcast router
//! - [`server`]: `GatewayServer`, the router and the listener
//! - [`websocket`]: per-client session lifecycle and heartbeat
//! - [`health`], [`metrics`], [`shutdown`]: operational endpoints and
//!   graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{EngineConfig, ServerConfig};
pub use engine::{EngineError, EngineHandle, EngineStatus, spawn_engine};
pub use server::GatewayServer;
