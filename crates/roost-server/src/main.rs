use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use roost_xmpp::module::ShutdownError;
use roost_xmpp::{InMemoryStorage, Modules, Router, Storage};
use tracing::{info, warn};

mod config;
mod telemetry;

use config::ServerConfig;

#[derive(Parser)]
#[command(name = "roost-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ROOST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init()?;
    let config = ServerConfig::load(cli.config.as_deref())?;

    info!("Roost Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let router = Arc::new(Router::new(&config.router, Arc::clone(&storage))?);
    let modules = Modules::new(&config.modules, Arc::clone(&router), storage);

    info!(hosts = ?router.host_names(), modules = ?modules.names(), "Roost Server ready");

    wait_for_signal().await?;
    info!("Shutdown signal received");

    match modules.shutdown(config.shutdown.timeout()).await {
        Ok(()) => info!("Roost Server stopped"),
        Err(ShutdownError::DeadlineExceeded { pending }) => {
            warn!(pending, "Shutdown deadline exceeded, exiting anyway");
        }
        Err(e) => warn!(error = %e, "Shutdown did not complete"),
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
