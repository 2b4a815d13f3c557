//! proxy-connect daemon
//!
//! Keeps the application connected to its local or remote proxy.
//!
//! ```text
//!   ┌──────────────┐   status / mode    ┌─────────────────────┐
//!   │  supervisor  │ ─────────────────▶ │  ConnectionManager  │
//!   │  probe loop  │ ◀───────────────── │  backoff + auth ban │
//!   └──────┬───────┘   reconnect timer  └──────────┬──────────┘
//!          │                                       │
//!          ▼                                       ▼
//!   ┌──────────────┐                    ┌─────────────────────┐
//!   │ management   │                    │ preferences.json    │ ◀── proxy-connect-cli
//!   │ API (HTTP)   │                    │ keyring, status.json│
//!   └──────────────┘                    └─────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use proxy_connect::lifecycle::{signals, startup, Shutdown};
use proxy_connect::observability::init_logging;
use proxy_connect::storage::PreferencesWatcher;
use proxy_connect::supervisor::StatusFile;
use proxy_connect::Supervisor;

#[derive(Parser)]
#[command(name = "proxy-connect")]
#[command(about = "Keeps a connection to a local or remote API proxy alive", long_about = None)]
struct Args {
    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::load_settings(args.config.as_deref())?;
    init_logging(&config.observability);

    tracing::info!("proxy-connect v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        local_endpoint = %config.local.endpoint_url,
        base_delay_secs = config.reconnect.base_delay_secs,
        max_delay_secs = config.reconnect.max_delay_secs,
        ban_threshold = config.auth_ban.failure_threshold,
        "Configuration loaded"
    );

    let manager = startup::build_manager(&config);
    let supervisor = Supervisor::new(manager, &config)
        .with_status_file(StatusFile::new(config.storage.status_path()));

    // Keep the watcher alive for the daemon's lifetime.
    let (watcher, store_changes) = PreferencesWatcher::new(&config.storage.preferences_path());
    let (_watch_handle, store_changes) = match watcher.run() {
        Ok(handle) => (Some(handle), Some(store_changes)),
        Err(e) => {
            tracing::warn!(error = %e, "Preferences watcher unavailable; changes from other processes need a restart");
            (None, None)
        }
    };

    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe(), store_changes));

    signals::wait_for_signal().await;
    shutdown.trigger();
    task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
