//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_request_duration_seconds` (histogram): latency of every forwarded request
//! - `proxy_target_request_duration_seconds{target}` (histogram): latency per route target
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade: no locks on the request path
//!   and no effect on serving if nothing is installed or the exporter is down
//! - Per-target handles are created once with the target and reused

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::routing::Target;

/// Global round-trip latency.
pub const REQUEST_DURATION: &str = "proxy_request_duration_seconds";

/// Round-trip latency labelled by target.
pub const TARGET_REQUEST_DURATION: &str = "proxy_target_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Sink for completed round-trip latencies.
///
/// Implementations must not block and must not fail visibly.
pub trait MetricsRecorder: Send + Sync {
    fn record_target(&self, target: &Target, elapsed: Duration);

    fn record_global(&self, elapsed: Duration);
}

/// Recorder backed by the global `metrics` registry.
#[derive(Clone)]
pub struct PrometheusRecorder {
    requests: Histogram,
}

impl PrometheusRecorder {
    pub fn new() -> Self {
        Self {
            requests: metrics::histogram!(REQUEST_DURATION),
        }
    }
}

impl Default for PrometheusRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn record_target(&self, target: &Target, elapsed: Duration) {
        target.timer().record(elapsed);
    }

    fn record_global(&self, elapsed: Duration) {
        self.requests.record(elapsed);
    }
}

/// Install the Prometheus exporter with a scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime, before any instrument is
/// created, or earlier handles stay detached from the exporter.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        );

    let result = builder.and_then(|b| b.install());
    match result {
        Ok(()) => {
            metrics::describe_histogram!(
                REQUEST_DURATION,
                Unit::Seconds,
                "Round-trip latency of forwarded requests"
            );
            metrics::describe_histogram!(
                TARGET_REQUEST_DURATION,
                Unit::Seconds,
                "Round-trip latency of forwarded requests by target"
            );
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}
