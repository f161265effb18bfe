//! Prometheus metrics.
//!
//! Thin wrappers over the `metrics` facade. When no recorder is installed
//! (tests, or the exporter failed to start) every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;
use tracing::warn;

/// Install the global Prometheus recorder.
///
/// Returns `None` if a recorder is already installed; the caller keeps
/// running without a `/metrics` endpoint.
pub fn install() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    }
}

/// Count a finished request by object class and response status.
pub fn record_request(class: &'static str, status: u16) {
    counter!("hlscache_requests_total", "class" => class, "status" => status.to_string())
        .increment(1);
}

/// Record time from request start until the response head was ready.
pub fn record_duration(class: &'static str, start: Instant) {
    histogram!("hlscache_request_duration_seconds", "class" => class)
        .record(start.elapsed().as_secs_f64());
}

/// Count a registry lookup as a hit or a miss.
pub fn record_lookup(class: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("hlscache_cache_lookups_total", "class" => class, "result" => result).increment(1);
}

/// Count a finished upstream fetch and the bytes it pulled.
pub fn record_fetch(outcome: &'static str, bytes: u64) {
    counter!("hlscache_fetches_total", "outcome" => outcome).increment(1);
    counter!("hlscache_fetched_bytes_total").increment(bytes);
}

pub fn record_evictions(count: usize) {
    counter!("hlscache_evictions_total").increment(count as u64);
}

pub fn set_cached_objects(count: usize) {
    gauge!("hlscache_cached_objects").set(count as f64);
}
