//! Common utilities for the demo binaries.
//!
//! Shared CLI parsing and logging setup — not part of the engine itself.

use anyhow::Result;
use clap::Parser;

/// Common CLI arguments for every binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Venue host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Venue port.
    #[arg(long, default_value = "9878")]
    pub port: u16,

    /// SenderCompID for this side of the session.
    #[arg(long, default_value = "BUYSIDE")]
    pub sender_comp_id: String,

    /// TargetCompID identifying the venue.
    #[arg(long, default_value = "VENUE")]
    pub target_comp_id: String,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging for one binary, tagging every event with
/// that binary's own `SenderCompID` so logs from several demo processes
/// can be told apart once aggregated.
pub fn init_logging(args: &CommonArgs) -> Result<()> {
    fix_core::utils::init_logger(&args.sender_comp_id, &args.log_level, args.json_logs);
    Ok(())
}
