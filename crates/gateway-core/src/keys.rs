//! State key construction: `Location(<name>).` re-keying and `Gateway.*` keys.

use serde_json::{Map, Value};

/// Always `true` in the initial payload; the gateway itself is reachable.
pub const GATEWAY_CONNECTED: &str = "Gateway.Connected";
/// The locations the client subscribed to, in request order.
pub const GATEWAY_LOCATIONS: &str = "Gateway.Locations";
/// Legacy single-upstream status key, sent to single-location clients only.
pub const GATEWAY_SCOREBOARD_CONNECTED: &str = "Gateway.ScoreboardConnected";

/// Prefix an upstream key with its location: `Location(<name>).<key>`.
pub fn location_key(location: &str, key: &str) -> String {
    format!("Location({location}).{key}")
}

/// Per-location upstream status key: `Gateway.Location(<name>).Connected`.
pub fn location_connected_key(location: &str) -> String {
    format!("Gateway.Location({location}).Connected")
}

/// Copy `state` with every key re-prefixed for `location`.
pub fn rekey_state(location: &str, state: &Map<String, Value>) -> Map<String, Value> {
    state
        .iter()
        .map(|(key, value)| (location_key(location, key), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_key_format() {
        assert_eq!(
            location_key("north", "ScoreBoard.CurrentGame.Team(1).Score"),
            "Location(north).ScoreBoard.CurrentGame.Team(1).Score"
        );
    }

    #[test]
    fn connected_key_format() {
        assert_eq!(
            location_connected_key("south"),
            "Gateway.Location(south).Connected"
        );
    }

    #[test]
    fn rekey_prefixes_every_key() {
        let state = json!({"A.B": 1, "C": "x"});
        let rekeyed = rekey_state("north", state.as_object().unwrap());
        assert_eq!(rekeyed.len(), 2);
        assert_eq!(rekeyed["Location(north).A.B"], 1);
        assert_eq!(rekeyed["Location(north).C"], "x");
        assert!(!rekeyed.contains_key("A.B"));
    }

    #[test]
    fn rekey_empty_state() {
        assert!(rekey_state("north", &Map::new()).is_empty());
    }
}
