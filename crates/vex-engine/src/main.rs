//! vexwatch entry point.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vex_engine::{AppConfig, Engine, TracingListener};
use vex_registry::{MarketClient, RestMarketSource};

/// Volatility expansion monitor for perpetual swaps.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VEX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the VER alert threshold
    #[arg(short, long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first handshake
    vex_ws::init_crypto();

    let args = Args::parse();

    // CLI arg > VEX_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("VEX_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    let found = Path::new(&config_path).exists();

    let mut config = AppConfig::load(&config_path)?;
    if let Some(threshold) = args.threshold {
        config.detector.ver_threshold = threshold;
    }

    vex_telemetry::init_logging(&config.telemetry.log_level)?;
    info!("Starting vexwatch v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(config_path = %config_path, "Config file not found, using defaults");
    }

    let client = MarketClient::new(&config.client_config())?;
    let source = RestMarketSource::new(
        client,
        config.sync.inst_type.clone(),
        config.backfill.bar.clone(),
        config.backfill.limit,
    );

    let engine = Engine::new(config, source, Arc::new(TracingListener))?;
    engine.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    engine.stop().await;

    Ok(())
}
