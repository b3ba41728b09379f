//! Prometheus metrics.
//!
//! Counters for punches, uploads and geofence checks, plus HTTP request
//! latency. The recorder is optional; without one every call is a no-op.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// HTTP requests counter metric name.
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";
/// Punch events counter metric name.
pub const METRIC_PUNCHES: &str = "punch_events_total";
/// Visit starts counter metric name.
pub const METRIC_VISIT_STARTS: &str = "visit_starts_total";
/// Uploaded images counter metric name.
pub const METRIC_UPLOADS: &str = "uploads_total";
/// Geofence checks counter metric name.
pub const METRIC_GEOFENCE_CHECKS: &str = "geofence_checks_total";

/// Register metric descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_counter!(METRIC_HTTP_REQUESTS, "Total number of HTTP requests handled");
    describe_counter!(METRIC_PUNCHES, "Total number of punch-in and punch-out events");
    describe_counter!(METRIC_VISIT_STARTS, "Total number of visit starts");
    describe_counter!(METRIC_UPLOADS, "Total number of stored images");
    describe_counter!(
        METRIC_GEOFENCE_CHECKS,
        "Total number of geofence checks by outcome"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder and return a render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Record HTTP request latency and count.
pub fn record_http_latency(start: Instant, endpoint: &str, status: u16) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
    counter!(
        METRIC_HTTP_REQUESTS,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a punch event.
pub fn record_punch(action: &str, visit_type: &str) {
    counter!(
        METRIC_PUNCHES,
        "action" => action.to_string(),
        "visit_type" => visit_type.to_string()
    )
    .increment(1);
}

/// Count a visit start.
pub fn inc_visit_starts() {
    counter!(METRIC_VISIT_STARTS).increment(1);
}

/// Count a stored image by type.
pub fn record_upload(extension: &str) {
    counter!(METRIC_UPLOADS, "type" => extension.to_string()).increment(1);
}

/// Count a geofence check by outcome.
pub fn record_geofence_check(within_radius: bool) {
    let outcome = if within_radius { "inside" } else { "outside" };
    counter!(METRIC_GEOFENCE_CHECKS, "outcome" => outcome).increment(1);
}

/// Records HTTP latency for an endpoint when dropped.
pub struct LatencyTimer {
    start: Instant,
    endpoint: String,
    status: u16,
}

impl LatencyTimer {
    /// Start timing a request to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.into(),
            status: 200,
        }
    }

    /// Set the status reported on drop.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_http_latency(self.start, &self.endpoint, self.status);
    }
}
