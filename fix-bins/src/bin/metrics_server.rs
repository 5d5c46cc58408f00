//! Stands up the Prometheus metrics HTTP endpoint on its own, for
//! deployments that run the engine and the scrape target as separate
//! processes sharing a registry over some other channel.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fix_core::monitoring::{MetricsRegistry, MetricsServer, MetricsServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:9090")]
    listen_addr: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    fix_core::utils::init_logger("metrics-server", &args.log_level, args.json_logs);

    let registry = Arc::new(MetricsRegistry::new()?);
    let config = MetricsServerConfig {
        listen_addr: args.listen_addr.parse()?,
        metrics_path: "/metrics".to_string(),
    };

    tracing::info!(addr = %config.listen_addr, "starting metrics server");
    MetricsServer::new(config, registry).serve().await
}
