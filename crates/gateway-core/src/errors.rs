//! Core error types.

use thiserror::Error;

/// Errors raised while building or querying gateway domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// One or more requested locations are not configured.
    #[error("Invalid location(s): {}. Available: {}", invalid.join(", "), valid.join(", "))]
    UnknownLocations {
        /// Requested names that matched no configured location.
        invalid: Vec<String>,
        /// Every configured location name.
        valid: Vec<String>,
    },
    /// A configured location name was empty after trimming.
    #[error("location name must not be empty")]
    EmptyLocationName,
    /// A configured location name would be shadowed by a fixed HTTP route.
    #[error("location name '{location}' is reserved for the /{location} endpoint")]
    ReservedLocationName {
        /// Offending location name.
        location: String,
    },
    /// A configured location had no upstream address.
    #[error("location '{location}' has an empty upstream url")]
    EmptyUpstreamUrl {
        /// Offending location name.
        location: String,
    },
    /// Neither named locations nor a legacy address were configured.
    #[error("no upstream locations configured")]
    NoLocations,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locations_display() {
        let err = CoreError::UnknownLocations {
            invalid: vec!["unknown".into()],
            valid: vec!["north".into(), "south".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid location(s): unknown. Available: north, south"
        );
    }

    #[test]
    fn empty_url_display_names_location() {
        let err = CoreError::EmptyUpstreamUrl {
            location: "north".into(),
        };
        assert!(err.to_string().contains("'north'"));
    }

    #[test]
    fn no_locations_display() {
        assert_eq!(
            CoreError::NoLocations.to_string(),
            "no upstream locations configured"
        );
    }
}
