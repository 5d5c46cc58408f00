//! Resilience patterns for production deployment.
//!
//! - Exponential backoff for session reconnect
//! - Inbound sequence-gap detection
//! - Global panic handler for graceful shutdown

pub mod backoff;
pub mod gap_detector;
pub mod panic;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use gap_detector::GapDetector;
pub use panic::install_panic_handler;
