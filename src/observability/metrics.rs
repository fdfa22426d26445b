//! Metrics collection and exposition.
//!
//! # Metrics
//! - `access_requests_total` (counter): fetches by operation, source, result
//! - `access_request_duration_seconds` (histogram): fetch latency by operation
//! - `access_upstream_attempts_total` (counter): attempts by host, outcome
//! - `access_upstream_attempt_duration_seconds` (histogram): attempt latency by host
//! - `access_cache_lookups_total` (counter): lookups by result (hit/miss/stale)
//! - `access_cache_entries` (gauge): entries in the cache index
//! - `access_cache_evictions_total` (counter): evictions by reason
//! - `access_pool_in_use` (gauge): checked-out connections per host
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished fetch.
pub fn record_request(operation: &str, source: &'static str, result: &'static str, elapsed: Duration) {
    counter!(
        "access_requests_total",
        "operation" => operation.to_string(),
        "source" => source,
        "result" => result
    )
    .increment(1);
    histogram!("access_request_duration_seconds", "operation" => operation.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one upstream attempt.
pub fn record_attempt(host: &str, outcome: &'static str, elapsed: Duration) {
    counter!("access_upstream_attempts_total", "host" => host.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("access_upstream_attempt_duration_seconds", "host" => host.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("access_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("access_cache_entries").set(size as f64);
}

pub fn record_cache_eviction(reason: &'static str) {
    counter!("access_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_pool_in_use(host: &str, in_use: usize) {
    gauge!("access_pool_in_use", "host" => host.to_string()).set(in_use as f64);
}
