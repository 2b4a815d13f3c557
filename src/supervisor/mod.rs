//! Reconnect supervision loop.
//!
//! # Data Flow
//! ```text
//! start / status reset to Disconnected (mode change, reload, manual reconnect)
//!     → attempt(): status Connecting → probe → mark_connected | Error(friendly)
//!     → on failure: manager.schedule_auto_reconnect(reconnect cycle)
//!
//! keep-alive tick (while connected)
//!     → probe without touching status
//!     → on failure: report Error, schedule reconnect
//!
//! auth ban expires
//!     → one reconnect cycle
//!
//! preferences rewritten by another process
//!     → manager.reload_persisted()
//! ```
//!
//! # Design Decisions
//! - The supervisor owns all network I/O; the manager only decides timing
//! - The failure-limit refusal is logged and left for a manual reconnect
//! - Every snapshot is mirrored to the status file when one is configured
//! - Exits on the shutdown broadcast

mod status;

use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::config::{AppConfig, LocalProxyConfig};
use crate::connection::{ConnectionManager, ConnectionMode, ConnectionSnapshot, ConnectionStatus, ScheduleOutcome};
use crate::probe::{ManagementClient, ProbeError, ProbeTarget};
use crate::resilience::friendly_error_message;

pub use status::{PublishedStatus, StatusFile};

#[derive(Clone)]
pub struct Supervisor {
    manager: ConnectionManager,
    local: LocalProxyConfig,
    keepalive: Duration,
    status_file: Option<StatusFile>,
}

impl Supervisor {
    pub fn new(manager: ConnectionManager, config: &AppConfig) -> Self {
        Self {
            manager,
            local: config.local.clone(),
            keepalive: Duration::from_secs(config.supervisor.keepalive_interval_secs),
            status_file: None,
        }
    }

    /// Mirror every snapshot to `status_file` while running.
    pub fn with_status_file(mut self, status_file: StatusFile) -> Self {
        self.status_file = Some(status_file);
        self
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Probe target for the current mode.
    pub fn target(&self) -> Result<ProbeTarget, ProbeError> {
        match self.manager.connection_mode() {
            ConnectionMode::Local => Ok(ProbeTarget::local(&self.local)),
            ConnectionMode::Remote => {
                let config = self.manager.remote_config().ok_or(ProbeError::NotConfigured)?;
                Ok(ProbeTarget::remote(&config, self.manager.remote_management_key()))
            }
        }
    }

    async fn probe(&self) -> Result<(), ProbeError> {
        let target = self.target()?;
        ManagementClient::new(&target)?.check().await
    }

    /// One connection attempt; the outcome is reported to the manager.
    pub async fn attempt(&self) -> Result<(), ProbeError> {
        self.manager.set_connection_status(ConnectionStatus::Connecting);
        let result = self.probe().await;
        match &result {
            Ok(()) => self.manager.mark_connected(),
            Err(e) => self.report_failure(e),
        }
        result
    }

    fn report_failure(&self, error: &ProbeError) {
        let raw = error.to_string();
        tracing::debug!(error = %raw, "Probe failed");
        self.manager
            .set_connection_status(ConnectionStatus::Error(friendly_error_message(&raw)));
    }

    /// Attempt now, and keep rescheduling with backoff until success or refusal.
    pub async fn reconnect_cycle(self) {
        if self.attempt().await.is_err() {
            self.schedule_retry();
        }
    }

    fn schedule_retry(&self) -> ScheduleOutcome {
        let supervisor = self.clone();
        let outcome = self
            .manager
            .schedule_auto_reconnect(move || supervisor.reconnect_cycle().boxed());
        match &outcome {
            ScheduleOutcome::Scheduled { delay } => {
                tracing::debug!(delay_secs = delay.as_secs(), "Reconnect queued");
            }
            ScheduleOutcome::Banned { remaining } => {
                tracing::info!(remaining_secs = remaining.as_secs(), "Auto-reconnect paused until the auth ban expires");
            }
            refused => {
                tracing::warn!(outcome = ?refused, "Auto-reconnect not scheduled; manual reconnect required");
            }
        }
        outcome
    }

    async fn keepalive_check(&self) {
        if let Err(e) = self.probe().await {
            tracing::warn!(error = %e, "Keep-alive probe failed");
            self.report_failure(&e);
            self.schedule_retry();
        }
    }

    fn publish(&self, snapshot: &ConnectionSnapshot) {
        if let Some(status_file) = &self.status_file {
            if let Err(e) = status_file.publish(snapshot) {
                tracing::warn!(path = %status_file.path().display(), error = %e, "Failed to publish status");
            }
        }
    }

    /// Run until the shutdown signal fires. `store_changes` yields when the
    /// preference store was rewritten by another process.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
        mut store_changes: Option<mpsc::UnboundedReceiver<()>>,
    ) {
        tracing::info!(
            mode = %self.manager.connection_mode(),
            keepalive_secs = self.keepalive.as_secs(),
            watching = store_changes.is_some(),
            "Connection supervisor starting"
        );

        let mut snapshots = self.manager.subscribe();
        let mut ticker = time::interval(self.keepalive);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut ban_retry: Option<Instant> = None;

        self.publish(&self.manager.snapshot());
        self.clone().reconnect_cycle().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.manager.connection_status().is_connected() {
                        self.keepalive_check().await;
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.publish(&snapshot);
                    ban_retry = snapshot
                        .auth_banned
                        .then(|| Instant::now() + self.manager.auth_ban_time_remaining());

                    if snapshot.status == ConnectionStatus::Disconnected && !snapshot.reconnect_scheduled {
                        tracing::info!(mode = %snapshot.mode, "Connection reset, reconnecting");
                        self.clone().reconnect_cycle().await;
                    }
                }
                _ = time::sleep_until(ban_retry.unwrap_or_else(Instant::now)), if ban_retry.is_some() => {
                    ban_retry = None;
                    if !self.manager.connection_status().is_connected() && !self.manager.is_reconnect_scheduled() {
                        tracing::info!("Auth ban expired, reconnecting");
                        self.clone().reconnect_cycle().await;
                    }
                }
                change = next_change(&mut store_changes) => match change {
                    Some(()) => {
                        if let Some(rx) = store_changes.as_mut() {
                            while rx.try_recv().is_ok() {}
                        }
                        self.manager.reload_persisted();
                    }
                    None => {
                        tracing::warn!("Preferences watcher stopped");
                        store_changes = None;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Supervisor received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.manager.cancel_auto_reconnect();
        if let Some(status_file) = &self.status_file {
            if let Err(e) = status_file.clear() {
                tracing::warn!(error = %e, "Failed to remove status file");
            }
        }
    }
}

async fn next_change(changes: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
