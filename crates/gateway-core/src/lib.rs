//! # gateway-core
//!
//! Domain types shared by the scoreboard gateway crates.
//!
//! - [`Location`] / [`LocationRegistry`]: named upstream sources, fixed at startup
//! - [`StateSnapshot`]: per-location accumulated state, merged from deltas
//! - [`keys`]: `Location(<name>).` re-keying and `Gateway.*` status keys
//! - [`selector`]: parsing of the client's requested location list
//! - [`protocol`]: upstream registration and state message shapes
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod keys;
pub mod location;
pub mod logging;
pub mod protocol;
pub mod selector;
pub mod snapshot;

pub use errors::{CoreError, Result};
pub use location::{Location, LocationRegistry};
pub use snapshot::StateSnapshot;
