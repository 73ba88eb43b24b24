//! Prometheus metrics for monitoring server health.
//!
//! Metrics are exposed in Prometheus text format on their own listener,
//! enabled by setting `METRICS_BIND`.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize the Prometheus exporter on the given address. Metrics are
/// scrapable at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

/// A WebSocket connection attached.
pub fn ws_connection_opened() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

/// A WebSocket connection detached.
pub fn ws_connection_closed() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

/// A client message arrived over a WebSocket.
pub fn ws_message_received(kind: &'static str) {
    metrics::counter!("ws_messages_received_total", "kind" => kind).increment(1);
}

/// A bet was accepted and debited.
pub fn bet_accepted(amount: i64) {
    metrics::counter!("bets_accepted_total").increment(1);
    metrics::counter!("chips_wagered_total").increment(amount.max(0) as u64);
}

/// An anonymous session was claimed by an authenticated identity.
pub fn identity_claimed() {
    metrics::counter!("identity_claims_total").increment(1);
}
