//! # gateway-settings
//!
//! Layered configuration for the scoreboard gateway.
//!
//! Settings are resolved from these layers, lowest priority first:
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: `~/.scoreboard-gateway/settings.json` or an explicit
//!    path, deep-merged over the defaults
//! 3. **Environment variables**: `GATEWAY_*` and the legacy
//!    `SCOREBOARD_WS_URL`
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
