//! dynamic-proxy binary.

use std::path::PathBuf;

use clap::Parser;

use dynamic_proxy::config::{load_config, ProxyConfig};
use dynamic_proxy::lifecycle::startup;
use dynamic_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "dynamic-proxy", version, about = "Dynamic HTTP reverse proxy")]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("dynamic-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    startup::run(config, args.config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
