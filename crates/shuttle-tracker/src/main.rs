//! # shuttle-tracker
//!
//! Shuttle fleet tracker binary: loads settings, starts logging and metrics,
//! then serves the HTTP management API and the `/ws` location feed until
//! ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shuttle_logging::LogFormat;
use shuttle_server::config::ServerConfig;
use shuttle_server::server::TrackerServer;
use shuttle_settings::{SettingsError, TrackerSettings};

/// Shuttle tracker server.
#[derive(Parser, Debug)]
#[command(name = "shuttle-tracker", about = "Real-time shuttle GPS tracker")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.shuttle-tracker/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn settings_file(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(shuttle_settings::settings_path)
    }

    /// Layer command-line flags over the loaded server config.
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

/// Load settings, keeping the load error so it can be logged once the
/// subscriber is up.
fn load(path: &std::path::Path) -> (TrackerSettings, Option<SettingsError>) {
    match shuttle_settings::load_settings_from_path(path) {
        Ok(settings) => (settings, None),
        Err(e) => (TrackerSettings::default(), Some(e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_file();
    let (settings, load_error) = load(&settings_path);

    shuttle_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_str_lossy(&settings.logging.format),
    );
    if let Some(e) = load_error {
        tracing::warn!(path = %settings_path.display(), error = %e, "failed to load settings, using defaults");
    }

    let mut config = ServerConfig::from(&settings.server);
    args.apply(&mut config);

    let metrics = shuttle_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = TrackerServer::new(config, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        heartbeat_secs = server.config().heartbeat_interval_secs,
        max_connections = server.config().max_connections,
        "Shuttle tracker listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
