//! Standalone inventory service with a seeded demo fleet.
//!
//! Runs the same HTTP service the integration tests use, as its own
//! process, so a local wardend has something to monitor.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wardend::inventory::{serve, InventoryState};

#[derive(Parser)]
#[command(name = "warden-inventoryd")]
#[command(about = "Warden demo inventory service", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8001")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("warden-inventoryd v{} starting", env!("CARGO_PKG_VERSION"));

    let state = InventoryState::seeded_demo().await;
    serve(state, &cli.listen).await
}
