//! Fan-out of upstream messages to subscribed clients.

use std::sync::Arc;

use gateway_core::protocol::rekeyed_message;
use metrics::counter;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::clients::{ClientId, ClientRegistry};
use crate::metrics::{BROADCAST_DELIVERIES_TOTAL, CLIENT_SEND_FAILURES_TOTAL};

/// Counters for one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers at the start of the broadcast.
    pub subscribers: usize,
    /// Clients the payload was queued for.
    pub delivered: usize,
    /// Clients dropped because their queue was full or closed.
    pub failed: usize,
    /// Clients dropped because their socket had already gone away.
    pub stale: usize,
}

/// Routes one upstream message to every subscriber of its location.
///
/// Single-location clients get the raw upstream text; multi-location
/// clients get the `Location(<name>).`-prefixed variant, built at most once
/// per broadcast and only if such a client exists.
#[derive(Clone, Debug)]
pub struct BroadcastRouter {
    log_threshold: usize,
}

impl BroadcastRouter {
    /// Router that logs broadcasts above `log_threshold` subscribers.
    pub fn new(log_threshold: usize) -> Self {
        Self { log_threshold }
    }

    /// Deliver `raw` (and its parsed `state`, if any) for `location`.
    ///
    /// Clients whose send fails are removed from the registry after the
    /// iteration.
    pub fn route(
        &self,
        clients: &mut ClientRegistry,
        location: &str,
        raw: &Arc<str>,
        state: Option<&Map<String, Value>>,
    ) -> BroadcastOutcome {
        let subscribers = clients.subscribers(location);
        if subscribers.is_empty() {
            return BroadcastOutcome::default();
        }

        let mut outcome = BroadcastOutcome {
            subscribers: subscribers.len(),
            ..BroadcastOutcome::default()
        };
        let mut rekeyed: Option<Arc<str>> = None;
        let mut dropped: Vec<ClientId> = Vec::new();

        for id in subscribers {
            let Some(client) = clients.get(&id) else {
                continue;
            };
            if !client.is_open() {
                outcome.stale += 1;
                dropped.push(id);
                continue;
            }
            let payload = match state {
                Some(state) if client.is_multi_location() => rekeyed
                    .get_or_insert_with(|| Arc::from(rekeyed_message(location, state)))
                    .clone(),
                _ => Arc::clone(raw),
            };
            if client.send(payload) {
                outcome.delivered += 1;
            } else {
                outcome.failed += 1;
                dropped.push(id);
            }
        }

        for id in &dropped {
            if clients.remove(id).is_some() {
                debug!(client_id = %id, location, "client dropped during broadcast");
            }
        }

        counter!(BROADCAST_DELIVERIES_TOTAL, "location" => location.to_owned())
            .increment(outcome.delivered as u64);
        if outcome.failed > 0 {
            counter!(CLIENT_SEND_FAILURES_TOTAL, "location" => location.to_owned())
                .increment(outcome.failed as u64);
        }

        if outcome.subscribers > self.log_threshold && outcome.delivered > 0 {
            info!(
                location,
                delivered = outcome.delivered,
                subscribers = outcome.subscribers,
                "broadcast"
            );
        }
        outcome
    }
}
