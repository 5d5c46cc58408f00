//! Tracing setup shared by every engine binary.
//!
//! One engine process may own several `Session`s at once, so every event
//! is tagged with the `engine` field below rather than relying on the
//! reader naming the process in the log message itself. The filter falls
//! back to `FIX_LOG` (checked before the generic `RUST_LOG`) so a venue
//! simulator and the engine under test can run side by side in the same
//! shell with independent verbosity.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn resolve_filter(default_level: &str) -> EnvFilter {
    if let Ok(from_env) = std::env::var("FIX_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&from_env) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the global tracing subscriber for one engine instance.
///
/// `engine_name` becomes a `engine` field on every emitted event — useful
/// once a process runs more than one `Session` and log lines need to be
/// attributed back to the right one. `json_logs` switches between
/// structured output for log aggregation and a human-readable format for
/// interactive use at a terminal.
pub fn init_logger(engine_name: &str, log_level: &str, json_logs: bool) {
    let env_filter = resolve_filter(log_level);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    tracing::info!(engine = engine_name, "logging initialized");
}
