//! Wire messages exchanged with upstream scoreboards and downstream viewers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys::{
    GATEWAY_CONNECTED, GATEWAY_LOCATIONS, GATEWAY_SCOREBOARD_CONNECTED, location_connected_key,
    rekey_state,
};
use crate::snapshot::StateSnapshot;

/// State paths registered with every upstream on connect.
pub const DEFAULT_REGISTER_PATHS: [&str; 10] = [
    "ScoreBoard.CurrentGame.Team(1).Name",
    "ScoreBoard.CurrentGame.Team(2).Name",
    "ScoreBoard.CurrentGame.Team(1).Score",
    "ScoreBoard.CurrentGame.Team(2).Score",
    "ScoreBoard.CurrentGame.CurrentPeriod",
    "ScoreBoard.CurrentGame.Period(*).Id",
    "ScoreBoard.CurrentGame.Period(*).Number",
    "ScoreBoard.CurrentGame.Period(*).CurrentJamNumber",
    "ScoreBoard.CurrentGame.Clock(Period).Time",
    "ScoreBoard.CurrentGame.Clock(Period).InvertedTime",
];

/// Default register paths as owned strings.
pub fn default_register_paths() -> Vec<String> {
    DEFAULT_REGISTER_PATHS.iter().map(ToString::to_string).collect()
}

/// Registration request sent to an upstream once its socket opens.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    /// Always `"Register"`.
    pub action: &'static str,
    /// Dotted state paths the gateway wants updates for.
    pub paths: &'a [String],
}

impl<'a> RegisterRequest<'a> {
    /// Build a registration request for `paths`.
    pub fn new(paths: &'a [String]) -> Self {
        Self {
            action: "Register",
            paths,
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `{ "state": { … } }` message, as sent by upstreams and to viewers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    /// Key/value state delta or snapshot.
    pub state: Map<String, Value>,
}

/// Parse an upstream message and extract its `state` object.
///
/// Returns `Ok(None)` for valid JSON without a `state` object, and an error
/// for unparsable input.
pub fn parse_state(raw: &str) -> serde_json::Result<Option<Map<String, Value>>> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(match value {
        Value::Object(mut obj) => match obj.remove("state") {
            Some(Value::Object(state)) => Some(state),
            _ => None,
        },
        _ => None,
    })
}

/// Serialize a state delta re-keyed for `location`.
pub fn rekeyed_message(location: &str, state: &Map<String, Value>) -> String {
    let mut msg = Map::with_capacity(1);
    let _ = msg.insert("state".into(), Value::Object(rekey_state(location, state)));
    Value::Object(msg).to_string()
}

/// Status and accumulated state for one requested location.
#[derive(Debug, Clone, Copy)]
pub struct LocationView<'a> {
    /// Location name.
    pub name: &'a str,
    /// Whether its upstream socket is currently open.
    pub connected: bool,
    /// Its accumulated state.
    pub snapshot: &'a StateSnapshot,
}

/// Compose the initial payload sent to a client right after it subscribes.
///
/// Contains `Gateway.Connected`, `Gateway.Locations`, one
/// `Gateway.Location(<name>).Connected` flag per location and every snapshot
/// key re-prefixed with its location. Single-location clients additionally
/// get the legacy `Gateway.ScoreboardConnected` flag.
pub fn initial_state(views: &[LocationView<'_>]) -> StateMessage {
    let mut state = Map::new();
    let _ = state.insert(GATEWAY_CONNECTED.into(), Value::Bool(true));
    let _ = state.insert(
        GATEWAY_LOCATIONS.into(),
        Value::Array(views.iter().map(|v| Value::String(v.name.into())).collect()),
    );
    if let [single] = views {
        let _ = state.insert(
            GATEWAY_SCOREBOARD_CONNECTED.into(),
            Value::Bool(single.connected),
        );
    }
    for view in views {
        let _ = state.insert(location_connected_key(view.name), Value::Bool(view.connected));
        view.snapshot.extend_prefixed(view.name, &mut state);
    }
    StateMessage { state }
}
