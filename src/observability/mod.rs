//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher:
//!     → logging.rs (structured log events)
//!     → metrics.rs (round-trip latency histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use self::metrics::{MetricsRecorder, PrometheusRecorder};
