use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug for more detail
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let config = cli::Args::parse().into_config();

    info!("depthcast receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("Remote signaling host: {}", config.server_url);

    match session::run(config).await {
        Ok(()) => {
            info!("Receiver exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
