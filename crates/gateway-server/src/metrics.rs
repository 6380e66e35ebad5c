//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Client connections accepted (counter).
pub const CLIENT_CONNECTIONS_TOTAL: &str = "gateway_client_connections_total";
/// Client disconnections (counter).
pub const CLIENT_DISCONNECTIONS_TOTAL: &str = "gateway_client_disconnections_total";
/// Client subscriptions rejected for unknown locations (counter).
pub const CLIENT_REJECTIONS_TOTAL: &str = "gateway_client_rejections_total";
/// Registered clients (gauge).
pub const CLIENTS_ACTIVE: &str = "gateway_clients_active";
/// Client sends that failed and deregistered the client (counter, labels: location).
pub const CLIENT_SEND_FAILURES_TOTAL: &str = "gateway_client_send_failures_total";
/// Messages delivered to client queues (counter, labels: location).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "gateway_broadcast_deliveries_total";
/// Upstream messages received (counter, labels: location).
pub const UPSTREAM_MESSAGES_TOTAL: &str = "gateway_upstream_messages_total";
/// Upstream messages that were not valid JSON (counter, labels: location).
pub const UPSTREAM_PARSE_ERRORS_TOTAL: &str = "gateway_upstream_parse_errors_total";
/// Upstream sockets opened (counter, labels: location).
pub const UPSTREAM_CONNECTS_TOTAL: &str = "gateway_upstream_connects_total";
/// Upstream sockets closed (counter, labels: location).
pub const UPSTREAM_DISCONNECTS_TOTAL: &str = "gateway_upstream_disconnects_total";
/// Upstream socket open, 1 or 0 (gauge, labels: location).
pub const UPSTREAM_CONNECTED: &str = "gateway_upstream_connected";
