//! Push-based observability: a Prometheus [`metrics::Metrics`] registry for
//! in-process counters/gauges, periodically rendered to a JSON log line by
//! [`reporter::MetricsReporter`]. No HTTP server — this process never
//! accepts inbound connections for metrics scraping.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
