//! Layered settings: compiled defaults, then the JSON file, then the
//! environment. The binary applies command-line flags last and re-validates.
//!
//! The file is overlaid on the defaults key by key, so `{"server":{"port":9000}}`
//! changes one field. A `null` in the file leaves the default alone. Arrays
//! such as `registerPaths` are taken whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::GatewaySettings;

/// Resolve the default settings file (`~/.scoreboard-gateway/settings.json`).
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".scoreboard-gateway")
        .join("settings.json")
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, overlaid with `path` if it exists, then the environment.
///
/// A missing file is not an error. Unreadable or malformed files are.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn read_settings_file(path: &Path) -> Result<GatewaySettings> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, running on defaults");
        return Ok(GatewaySettings::default());
    }

    debug!(path = %path.display(), "reading settings file");
    let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let overlay: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(GatewaySettings::default())?;
    let merged = deep_merge(defaults, overlay);

    Ok(serde_json::from_value(merged)?)
}

/// Overlay `overlay` onto `base`. Objects merge per key; anything else in
/// the overlay replaces the base value, except `null`, which is skipped.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    let (mut fields, overrides) = match (base, overlay) {
        (Value::Object(fields), Value::Object(overrides)) => (fields, overrides),
        (_, overlay) => return overlay,
    };
    for (key, value) in overrides.into_iter().filter(|(_, v)| !v.is_null()) {
        let merged = match fields.remove(&key) {
            Some(existing) => deep_merge(existing, value),
            None => value,
        };
        let _ = fields.insert(key, merged);
    }
    Value::Object(fields)
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut GatewaySettings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and leave the file/default
/// value in place.
pub fn apply_env_overrides_with<F>(settings: &mut GatewaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // server
    if let Some(v) = env.string("GATEWAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16_in("GATEWAY_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64_in("GATEWAY_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.usize_in("GATEWAY_CLIENT_QUEUE", 1, 1_000_000) {
        settings.server.client_queue_capacity = v;
    }

    // upstream
    if let Some(v) = env.string("SCOREBOARD_WS_URL") {
        settings.upstream.scoreboard_url = v;
    }
    if let Some(raw) = env.string("GATEWAY_LOCATIONS") {
        match parse_locations(&raw) {
            Some(locations) => settings.upstream.locations = locations,
            None => {
                warn!(key = "GATEWAY_LOCATIONS", value = %raw, "invalid location list, ignoring");
            }
        }
    }
    if let Some(v) = env.u64_in("GATEWAY_RECONNECT_DELAY_MS", 10, 600_000) {
        settings.upstream.reconnect_delay_ms = v;
    }
    if let Some(v) = env.bool("GATEWAY_EAGER_CONNECT") {
        settings.upstream.eager_connect = v;
    }

    // logging
    if let Some(v) = env.string("GATEWAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an unsigned integer and check it against an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `name=url,name=url` into a location map.
///
/// Returns `None` if any entry lacks a name or a url.
pub fn parse_locations(raw: &str) -> Option<BTreeMap<String, String>> {
    let mut locations = BTreeMap::new();
    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let (name, url) = entry.split_once('=')?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return None;
        }
        let _ = locations.insert(name.to_string(), url.to_string());
    }
    Some(locations)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "not a boolean, keeping configured value");
        }
        parsed
    }

    fn u16_in(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.ranged(name, min, max)
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn usize_in(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.ranged(name, min, max)
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let parsed = parse_in_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "out of range, keeping configured value");
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn file_port_keeps_default_host() {
        let base = serde_json::json!({"server": {"port": 8080, "host": "0.0.0.0"}});
        let merged = deep_merge(base, serde_json::json!({"server": {"port": 9000}}));
        assert_eq!(merged["server"]["port"], 9000);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn register_paths_replaced_not_appended() {
        let base = serde_json::json!({"registerPaths": ["a", "b", "c"]});
        let merged = deep_merge(base, serde_json::json!({"registerPaths": ["x"]}));
        assert_eq!(merged["registerPaths"], serde_json::json!(["x"]));
    }

    #[test]
    fn null_in_file_keeps_default() {
        let base = serde_json::json!({"scoreboardUrl": "ws://a/WS/", "eagerConnect": true});
        let merged = deep_merge(base, serde_json::json!({"scoreboardUrl": null}));
        assert_eq!(merged["scoreboardUrl"], "ws://a/WS/");
        assert_eq!(merged["eagerConnect"], true);
    }

    #[test]
    fn locations_map_gains_new_names() {
        let base = serde_json::json!({"locations": {"north": "ws://n/WS/"}});
        let merged = deep_merge(base, serde_json::json!({"locations": {"south": "ws://s/WS/"}}));
        assert_eq!(merged["locations"]["north"], "ws://n/WS/");
        assert_eq!(merged["locations"]["south"], "ws://s/WS/");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9100},"upstream":{"locations":{"north":"ws://n/WS/"},"reconnectDelayMs":250}}"#,
        )
        .unwrap();
        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);
        assert_eq!(settings.upstream.locations["north"], "ws://n/WS/");
        assert_eq!(settings.upstream.reconnect_delay_ms, 250);
        assert_eq!(settings.upstream.register_paths.len(), 10);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Malformed(_))
        ));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"clientQueueCapacity":0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Invalid {
                field: "server.clientQueueCapacity",
                ..
            })
        ));
    }

    #[test]
    fn env_overrides_server_and_upstream() {
        let mut settings = GatewaySettings::default();
        apply_env_overrides_with(
            &mut settings,
            env_of(&[
                ("GATEWAY_PORT", "9000"),
                ("GATEWAY_HOST", "127.0.0.1"),
                ("SCOREBOARD_WS_URL", "ws://10.0.0.9:8000/WS/"),
                ("GATEWAY_RECONNECT_DELAY_MS", "500"),
                ("GATEWAY_EAGER_CONNECT", "off"),
                ("GATEWAY_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.upstream.scoreboard_url, "ws://10.0.0.9:8000/WS/");
        assert_eq!(settings.upstream.reconnect_delay_ms, 500);
        assert!(!settings.upstream.eager_connect);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn env_locations_parsed() {
        let mut settings = GatewaySettings::default();
        apply_env_overrides_with(
            &mut settings,
            env_of(&[("GATEWAY_LOCATIONS", "north=ws://n/WS/, south=ws://s/WS/")]),
        );
        assert_eq!(settings.upstream.locations.len(), 2);
        assert_eq!(settings.upstream.locations["south"], "ws://s/WS/");
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut settings = GatewaySettings::default();
        apply_env_overrides_with(
            &mut settings,
            env_of(&[
                ("GATEWAY_PORT", "99999"),
                ("GATEWAY_EAGER_CONNECT", "maybe"),
                ("GATEWAY_LOCATIONS", "north"),
                ("GATEWAY_HOST", "   "),
            ]),
        );
        assert_eq!(settings.server.port, 8080);
        assert!(settings.upstream.eager_connect);
        assert!(settings.upstream.locations.is_empty());
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range::<u16>("1", 1, 10), Some(1));
        assert_eq!(parse_in_range::<u16>("10", 1, 10), Some(10));
        assert_eq!(parse_in_range::<u16>("0", 1, 10), None);
        assert_eq!(parse_in_range::<u16>("-1", 1, 10), None);
        assert_eq!(parse_in_range::<u64>("abc", 1, 10), None);
    }

    #[test]
    fn parse_locations_accepts_equals_in_url() {
        let locs = parse_locations("north=ws://n/WS/?a=b").unwrap();
        assert_eq!(locs["north"], "ws://n/WS/?a=b");
    }

    #[test]
    fn parse_locations_rejects_missing_parts() {
        assert!(parse_locations("north=").is_none());
        assert!(parse_locations("=ws://x").is_none());
        assert!(parse_locations("north").is_none());
    }

    #[test]
    fn parse_locations_empty_is_empty_map() {
        assert!(parse_locations("").unwrap().is_empty());
    }
}
