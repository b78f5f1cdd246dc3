//! Ensemble Router Server
//!
//! Accepts browser clients over WebSocket, applies the global routing mode
//! to their gestures and forwards the result to one OSC sink.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use ensemble_bridge::OscEmitter;
use ensemble_core::RoutingMode;
use ensemble_router::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "ensemble-router")]
#[command(about = "Ensemble multi-user gesture router")]
#[command(version)]
struct Cli {
    /// WebSocket listen host
    #[arg(long)]
    ws_host: Option<String>,

    /// WebSocket listen port
    #[arg(long)]
    ws_port: Option<u16>,

    /// OSC sink host
    #[arg(long)]
    osc_host: Option<String>,

    /// OSC sink port
    #[arg(long)]
    osc_port: Option<u16>,

    /// Local address for the outbound OSC socket
    #[arg(long)]
    osc_bind: Option<String>,

    /// Initial routing mode (separate, single, blended, zones)
    #[arg(short, long)]
    mode: Option<RoutingMode>,

    /// Number of zones, a perfect square
    #[arg(short, long)]
    zones: Option<u32>,

    /// Largest accepted inbound frame in bytes
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            ws_host: self.ws_host.clone(),
            ws_port: self.ws_port,
            osc_host: self.osc_host.clone(),
            osc_port: self.osc_port,
            osc_bind: self.osc_bind.clone(),
            mode: self.mode,
            zones: self.zones,
            max_message_size: self.max_message_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = file.merge(cli.overrides());
    config.validate()?;

    tracing::info!("Starting Ensemble Router");

    let emitter = OscEmitter::bind(config.emitter_config())
        .await
        .with_context(|| format!("Failed to bind OSC socket on {}", config.osc_bind))?;

    let router = Router::new(config.router_config(), Arc::new(emitter))?;
    let addr = config.ws_addr();

    tokio::select! {
        result = router.serve_websocket(&addr) => {
            result.with_context(|| format!("WebSocket server on {} failed", addr))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl+c")?;
            tracing::info!("Received shutdown signal");
        }
    }

    router.stop().await;
    tracing::info!("Router stopped");

    Ok(())
}
