//! NestFiler: browse nested archives and render thumbnails from the command line

mod cli;
mod commands;

use anyhow::Result;
use app_core::{AppConfig, Services};
use clap::Parser;
use cli::Cli;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Held until exit so buffered file logs are flushed
    let _log_guard = app_log::init(&config.log)?;
    tracing::info!("NestFiler {} starting", env!("CARGO_PKG_VERSION"));

    let services = Services::new(&config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let result = commands::run(&services, cli.command, &cancel).await;
    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }

    services.shutdown();
    result
}
