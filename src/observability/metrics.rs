//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method, status, outcome
//! - `bridge_request_duration_seconds` (histogram): end-to-end latency
//! - `bridge_active_connections` (gauge): live control-channel connections
//! - `bridge_inflight_requests` (gauge): requests holding a queue
//! - `bridge_inbound_messages_total` (counter): channel events by routing outcome
//!
//! Without an installed recorder every call is a no-op, so unit tests never
//! need to set one up.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "bridge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    metrics::histogram!("bridge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn set_active_connections(count: usize) {
    metrics::gauge!("bridge_active_connections").set(count as f64);
}

pub fn inflight_started() {
    metrics::gauge!("bridge_inflight_requests").increment(1.0);
}

pub fn inflight_finished() {
    metrics::gauge!("bridge_inflight_requests").decrement(1.0);
}

pub fn record_inbound(outcome: &'static str) {
    metrics::counter!("bridge_inbound_messages_total", "outcome" => outcome).increment(1);
}
