//! Client-facing WebSocket handling.

pub mod heartbeat;
pub mod session;
