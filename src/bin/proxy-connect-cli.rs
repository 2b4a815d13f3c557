use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::oneshot;

use proxy_connect::connection::{RemoteConfigUpdate, ScheduleOutcome};
use proxy_connect::lifecycle::startup;
use proxy_connect::observability::init_logging;
use proxy_connect::resilience::classify;
use proxy_connect::supervisor::StatusFile;
use proxy_connect::{ConnectionManager, ConnectionMode, RemoteConnectionConfig, Supervisor};

#[derive(Parser)]
#[command(name = "proxy-connect-cli")]
#[command(about = "Manage the proxy connection mode and remote endpoint", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show mode, remote config and connection state
    Status,
    /// Switch between local and remote mode
    Mode {
        #[arg(value_parser = ["local", "remote"])]
        mode: String,
    },
    /// Manage the remote endpoint
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Test the proxy for the current mode once and classify the result
    Probe,
    /// Clear failure counters and the auth ban, and ask the daemon to reconnect
    Reset,
    /// Connect to the proxy for the current mode, retrying with backoff
    Connect {
        /// Give up after this many attempts
        #[arg(short, long, default_value_t = 3)]
        attempts: u32,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Configure a new remote endpoint and switch to remote mode
    Set {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "Remote proxy")]
        name: String,
        #[arg(long)]
        key: String,
        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Change fields of the current remote endpoint
    Update {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        verify_ssl: Option<bool>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Replace the management key of the current remote endpoint
    Key { key: String },
    /// Remove the remote endpoint and its key
    Clear,
    /// Print the current remote endpoint
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = startup::load_settings(cli.config.as_deref())?;
    init_logging(&config.observability);

    let manager = startup::build_manager(&config);

    match cli.command {
        Commands::Status => print_status(&manager, &StatusFile::new(config.storage.status_path()))?,
        Commands::Mode { mode } => {
            let mode: ConnectionMode = mode.parse()?;
            if mode == ConnectionMode::Remote && !manager.has_valid_remote_config() {
                eprintln!("Error: no valid remote endpoint configured (use `remote set`)");
                std::process::exit(1);
            }
            manager.set_mode(mode);
            println!("Mode: {mode}");
            warn_persistence(&manager);
        }
        Commands::Remote { command } => run_remote(&manager, command)?,
        Commands::Probe => {
            let supervisor = Supervisor::new(manager.clone(), &config);
            if !probe(&supervisor).await? {
                std::process::exit(1);
            }
        }
        Commands::Reset => {
            manager.request_reconnect();
            println!("Failure counters reset; reconnect requested");
            warn_persistence(&manager);
        }
        Commands::Connect { attempts } => {
            let supervisor = Supervisor::new(manager.clone(), &config);
            if !connect(&supervisor, attempts.max(1)).await {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn run_remote(manager: &ConnectionManager, command: RemoteCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        RemoteCommands::Set { url, name, key, insecure, timeout } => {
            let config = RemoteConnectionConfig::new(url, name)
                .with_verify_ssl(!insecure)
                .with_timeout_seconds(timeout);
            if !config.is_valid() {
                eprintln!("Error: '{}' is not a valid http(s) URL", config.endpoint_url);
                std::process::exit(1);
            }
            manager.switch_to_remote(config, &key);
            manager.request_reconnect();
            println!("Remote endpoint saved; mode: remote");
        }
        RemoteCommands::Update { url, name, verify_ssl, timeout } => {
            let update = RemoteConfigUpdate {
                endpoint_url: url,
                display_name: name,
                verify_ssl,
                timeout_seconds: timeout,
            };
            if manager.remote_config().is_none() {
                eprintln!("Error: no remote endpoint configured");
                std::process::exit(1);
            }
            if !update.is_empty() {
                manager.update_remote_config(&update);
                manager.request_reconnect();
            }
            print_json(&manager.remote_config())?;
        }
        RemoteCommands::Key { key } => {
            if manager.remote_config().is_none() {
                eprintln!("Error: no remote endpoint configured");
                std::process::exit(1);
            }
            manager.update_management_key(&key);
            println!("Management key updated");
        }
        RemoteCommands::Clear => {
            manager.clear_remote_config();
            println!("Remote endpoint cleared; mode: {}", manager.connection_mode());
        }
        RemoteCommands::Show => print_json(&manager.remote_config())?,
    }
    warn_persistence(manager);
    Ok(())
}

/// Single attempt with the raw and friendly error text.
async fn probe(supervisor: &Supervisor) -> Result<bool, Box<dyn std::error::Error>> {
    let manager = supervisor.manager();
    let endpoint = supervisor.target().ok().map(|t| t.endpoint_url);
    let result = supervisor.attempt().await;
    let (kind, raw) = match &result {
        Ok(()) => (None, None),
        Err(e) => {
            let raw = e.to_string();
            (Some(classify(&raw).to_string()), Some(raw))
        }
    };
    print_json(&json!({
        "mode": manager.connection_mode(),
        "endpoint": endpoint,
        "reachable": result.is_ok(),
        "error_kind": kind,
        "error": raw,
        "message": manager.last_error(),
    }))?;
    Ok(result.is_ok())
}

/// Attempt a connection, waiting out the manager's backoff between attempts.
async fn connect(supervisor: &Supervisor, attempts: u32) -> bool {
    let manager = supervisor.manager();
    println!("Connecting ({} mode)...", manager.connection_mode());

    for attempt in 1..=attempts {
        match supervisor.attempt().await {
            Ok(()) => {
                println!("Connected");
                return true;
            }
            Err(e) => {
                let raw = e.to_string();
                println!(
                    "Attempt {attempt}/{attempts} failed [{}]: {}",
                    classify(&raw),
                    manager.last_error().unwrap_or(raw)
                );
            }
        }
        if attempt == attempts {
            break;
        }

        let (fired, wait) = oneshot::channel();
        match manager.schedule_auto_reconnect(move || async move {
            let _ = fired.send(());
        }) {
            ScheduleOutcome::Scheduled { delay } => {
                println!("Retrying in {}s", delay.as_secs());
                if wait.await.is_err() {
                    break;
                }
            }
            _ => {
                if let Some(reason) = manager.last_error() {
                    println!("{reason}");
                }
                break;
            }
        }
    }
    false
}

fn print_status(manager: &ConnectionManager, status_file: &StatusFile) -> Result<(), Box<dyn std::error::Error>> {
    let daemon = match status_file.read() {
        Ok(published) => published,
        Err(e) => {
            eprintln!("Warning: unreadable daemon status: {e}");
            None
        }
    };
    let key_stored = manager.remote_management_key().is_some();
    print_json(&json!({
        "mode": manager.connection_mode(),
        "remote_config": manager.remote_config(),
        "has_valid_remote_config": manager.has_valid_remote_config(),
        "management_key_stored": key_stored,
        "daemon_running": daemon.is_some(),
        "daemon": daemon,
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn warn_persistence(manager: &ConnectionManager) {
    if let Some(warning) = manager.snapshot().persistence_warning {
        eprintln!("Warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_one_shot_subcommands() {
        let cli = Cli::try_parse_from(["proxy-connect-cli", "probe"]).unwrap();
        assert!(matches!(cli.command, Commands::Probe));
        let cli = Cli::try_parse_from(["proxy-connect-cli", "--config", "x.toml", "reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(Cli::try_parse_from(["proxy-connect-cli", "mode", "satellite"]).is_err());
    }
}
