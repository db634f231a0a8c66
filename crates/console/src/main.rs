//! Bluetooth Console - Main Entry Point

use clap::Parser;
use console::{init_logging, run, settings, Cli};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    info!("=== Bluetooth Console v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = settings::load(cli.config.as_deref())?;
    if let Some(device) = &cli.device {
        config.transport.device = device.clone();
    }

    run(cli, config).await
}
