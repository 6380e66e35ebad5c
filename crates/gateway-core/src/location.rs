//! Upstream locations and the static registry built at startup.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::errors::{CoreError, Result};
use crate::selector::DEFAULT_LOCATION;

/// Names taken by fixed HTTP routes, so `/<name>` would never reach a viewer.
pub const RESERVED_LOCATION_NAMES: [&str; 2] = ["health", "metrics"];

/// A named upstream live-scoring source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Normalized (trimmed, lower-case) location name.
    pub name: String,
    /// WebSocket address of the upstream scoreboard.
    pub upstream_url: String,
}

impl Location {
    /// Build a location, normalizing the name and validating both fields.
    pub fn new(name: &str, upstream_url: &str) -> Result<Self> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(CoreError::EmptyLocationName);
        }
        if RESERVED_LOCATION_NAMES.contains(&name.as_str()) {
            return Err(CoreError::ReservedLocationName { location: name });
        }
        let upstream_url = upstream_url.trim();
        if upstream_url.is_empty() {
            return Err(CoreError::EmptyUpstreamUrl { location: name });
        }
        Ok(Self {
            name,
            upstream_url: upstream_url.to_string(),
        })
    }
}

/// Trim and lower-case a location name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Immutable mapping of location name to [`Location`].
///
/// Built once from configuration and never mutated afterwards. Names iterate
/// in sorted order, which keeps rejection messages and health output stable.
#[derive(Clone, Debug, Default)]
pub struct LocationRegistry {
    locations: BTreeMap<String, Location>,
}

impl LocationRegistry {
    /// Build the registry from named locations, falling back to a single
    /// [`DEFAULT_LOCATION`] pointing at `legacy_url` when none are named.
    pub fn from_config<I, N, U>(named: I, legacy_url: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = (N, U)>,
        N: AsRef<str>,
        U: AsRef<str>,
    {
        let mut locations = BTreeMap::new();
        for (name, url) in named {
            let location = Location::new(name.as_ref(), url.as_ref())?;
            if let Some(previous) = locations.insert(location.name.clone(), location) {
                warn!(location = %previous.name, "duplicate location name, last entry wins");
            }
        }

        if locations.is_empty() {
            let Some(url) = legacy_url.filter(|u| !u.trim().is_empty()) else {
                return Err(CoreError::NoLocations);
            };
            let location = Location::new(DEFAULT_LOCATION, url)?;
            let _ = locations.insert(location.name.clone(), location);
        }

        Ok(Self { locations })
    }

    /// Look up a location by normalized name.
    pub fn get(&self, name: &str) -> Option<&Location> {
        self.locations.get(name)
    }

    /// Whether a location with this normalized name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    /// All configured names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.locations.keys().cloned().collect()
    }

    /// Iterate over all locations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Number of configured locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the registry is empty (never true for a registry built by
    /// [`LocationRegistry::from_config`]).
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Check that every requested name is configured.
    ///
    /// On failure the error carries every unknown name (in request order) and
    /// the full list of valid names.
    pub fn validate(&self, requested: &[String]) -> Result<()> {
        let invalid: Vec<String> = requested
            .iter()
            .filter(|name| !self.contains(name))
            .cloned()
            .collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(CoreError::UnknownLocations {
                invalid,
                valid: self.names(),
            })
        }
    }
}
