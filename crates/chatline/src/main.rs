//! # chatline
//!
//! Chat relay binary: resolves settings, starts the hub and the
//! HTTP/WebSocket server, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatline_hub::{Hub, HubConfig};
use chatline_server::metrics::{install_recorder, spawn_upkeep};
use chatline_server::{ChatServer, ServerConfig};
use chatline_settings::ChatlineSettings;
use clap::Parser;

/// How often histogram buckets are drained.
const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Real-time chat relay server.
#[derive(Parser, Debug)]
#[command(name = "chatline", version, about = "Real-time chat relay server")]
struct Cli {
    /// Port to bind (0 for auto-assign).
    #[arg(short, long)]
    port: Option<u16>,

    /// Messages kept for replay to new clients (0 keeps everything).
    #[arg(short = 's', long)]
    history_size: Option<usize>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Settings file (defaults to `~/.chatline/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the settings file and the environment.
    fn apply(&self, settings: &mut ChatlineSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(size) = self.history_size {
            settings.hub.history_capacity = size;
        }
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(chatline_settings::settings_path);
    let mut settings = chatline_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    chatline_core::logging::init_subscriber(&settings.logging.level);
    tracing::info!(
        path = %settings_path.display(),
        host = %settings.server.host,
        port = settings.server.port,
        history_capacity = settings.hub.history_capacity,
        "settings resolved"
    );

    let metrics_handle = install_recorder().context("failed to install metrics recorder")?;

    let hub = Arc::new(Hub::new(HubConfig::from(&settings.hub)));
    let server = ChatServer::new(
        ServerConfig::from(&settings.server),
        hub,
        metrics_handle.clone(),
    );
    let (addr, server_handle) = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {}", server.config().bind_address()))?;
    let upkeep = spawn_upkeep(
        metrics_handle,
        METRICS_UPKEEP_INTERVAL,
        server.shutdown().token(),
    );
    tracing::info!(%addr, "chatline ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("ctrl-c received, shutting down");

    let drained = server
        .shutdown()
        .graceful_shutdown(vec![server_handle, upkeep], None)
        .await;
    tracing::info!(drained, "chatline stopped");
    Ok(())
}
