//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the gateway could not produce a usable configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or a field has the wrong shape.
    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A field parsed but its value cannot be run with.
    #[error("{field}: {reason}")]
    Invalid {
        /// camelCase path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
