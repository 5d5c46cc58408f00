//! Monitoring and observability module.
//!
//! Prometheus metrics export plus the HTTP server that serves them for
//! scraping.

pub mod metrics;
pub mod server;

pub use metrics::{LatencyMetrics, MetricsRegistry, PoolMetrics, SessionMetrics, ThroughputMetrics};
pub use server::{MetricsServer, MetricsServerConfig};
