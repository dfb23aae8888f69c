//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rest_requests_total` (counter): requests by method, status, route
//! - `rest_request_duration_seconds` (histogram): dispatch latency
//! - `rest_sessions_active` (gauge): open raw-mode sessions
//! - `rest_sessions_total` (counter): accepted raw-mode sessions
//!
//! # Design Decisions
//! - Unmatched paths share one `unmatched` label to bound cardinality

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape endpoint.
/// Must run inside a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(address).install()?;
    tracing::info!(address = %address, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, started: Instant) {
    counter!(
        "rest_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "path" => route.to_string()
    )
    .increment(1);

    histogram!(
        "rest_request_duration_seconds",
        "method" => method.to_string(),
        "path" => route.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_session_opened() {
    gauge!("rest_sessions_active").increment(1.0);
    counter!("rest_sessions_total").increment(1);
}

pub fn record_session_closed() {
    gauge!("rest_sessions_active").decrement(1.0);
}
