//! Connection mode, status and reconnect supervision.
//!
//! # Responsibilities
//! - Own mode, remote config, status, failure counters and ban expiry
//! - Persist mode/config to the preference store and keys to the credential store
//! - Schedule caller-supplied reconnect actions with backoff
//! - Publish a snapshot after every mutation
//!
//! # Design Decisions
//! - One mutex serializes every operation; nothing awaits while holding it
//! - The manager never performs network I/O; callers probe and report back
//! - Store failures are logged and surfaced as a warning, never rolled back

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::{AppConfig, CredentialBackend};
use crate::connection::scheduler::ReconnectSlot;
use crate::connection::types::{
    now_epoch_secs, ConnectionMode, ConnectionSnapshot, ConnectionStatus, RemoteConfigUpdate,
    RemoteConnectionConfig,
};
use crate::resilience::{auth_ban, friendly_error_message, AuthBanPolicy, BackoffPolicy};
use crate::storage::preferences::{CONNECTION_MODE_KEY, RECONNECT_REQUEST_KEY, REMOTE_CONFIG_KEY};
use crate::storage::{
    CredentialStore, FileCredentialStore, JsonFilePreferences, KeyringCredentialStore, PreferenceStore,
    StoreError,
};

/// Result of [`ConnectionManager::schedule_auto_reconnect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A reconnect will run after `delay` unless cancelled.
    Scheduled { delay: Duration },
    /// Refused: the auth ban is still active.
    Banned { remaining: Duration },
    /// Refused: the failure limit was reached; counters must be reset first.
    /// `failures` includes the refusal itself.
    TooManyFailures { failures: u32 },
    /// Refused: called outside a Tokio runtime.
    NoRuntime,
}

struct ManagerState {
    mode: ConnectionMode,
    remote_config: Option<RemoteConnectionConfig>,
    status: ConnectionStatus,
    last_error: Option<String>,
    consecutive_failures: u32,
    auth_ban_until: Option<Instant>,
    reconnect: ReconnectSlot,
    persistence_warning: Option<String>,
    /// Last reconnect request token seen in the preference store.
    reconnect_request: Option<String>,
    /// Store writes attempted / failed during the current operation.
    writes: (u32, u32),
}

impl ManagerState {
    fn snapshot(&self, now: Instant) -> ConnectionSnapshot {
        ConnectionSnapshot {
            mode: self.mode,
            remote_config: self.remote_config.clone(),
            status: self.status.clone(),
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            auth_banned: auth_ban::is_banned(now, self.auth_ban_until),
            auth_ban_remaining_secs: auth_ban::remaining(now, self.auth_ban_until).as_secs(),
            reconnect_scheduled: self.reconnect.is_pending(),
            persistence_warning: self.persistence_warning.clone(),
        }
    }

    fn record(&mut self, what: &str, result: Result<(), StoreError>) {
        self.writes.0 += 1;
        if let Err(e) = result {
            self.writes.1 += 1;
            tracing::warn!(what, error = %e, "Failed to persist connection state");
            self.persistence_warning = Some(format!("failed to persist {what}: {e}"));
        }
    }
}

struct Inner {
    state: Mutex<ManagerState>,
    credentials: Arc<dyn CredentialStore>,
    preferences: Arc<dyn PreferenceStore>,
    backoff: BackoffPolicy,
    auth_ban: AuthBanPolicy,
    snapshots: watch::Sender<ConnectionSnapshot>,
}

/// Shared handle to the connection state. Cloning is cheap; all clones
/// operate on the same state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Manager with the default backoff and ban policies.
    pub fn new(credentials: Arc<dyn CredentialStore>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self::with_policies(
            credentials,
            preferences,
            BackoffPolicy::default(),
            AuthBanPolicy::default(),
        )
    }

    /// Manager backed by the stores and policies named in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let credentials: Arc<dyn CredentialStore> = match config.storage.credential_backend {
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
            CredentialBackend::File => {
                tracing::warn!(
                    path = %config.storage.credentials_path().display(),
                    "Storing management keys in a plain file"
                );
                Arc::new(FileCredentialStore::new(config.storage.credentials_path()))
            }
        };
        let preferences = Arc::new(JsonFilePreferences::new(config.storage.preferences_path()));
        Self::with_policies(
            credentials,
            preferences,
            BackoffPolicy::from(&config.reconnect),
            AuthBanPolicy::from_config(&config.auth_ban, &config.reconnect),
        )
    }

    /// Load persisted mode and remote config; anything unreadable counts as absent.
    pub fn with_policies(
        credentials: Arc<dyn CredentialStore>,
        preferences: Arc<dyn PreferenceStore>,
        backoff: BackoffPolicy,
        auth_ban: AuthBanPolicy,
    ) -> Self {
        let mode = load_mode(preferences.as_ref());
        let remote_config = load_remote_config(preferences.as_ref());
        let reconnect_request = preferences.get(RECONNECT_REQUEST_KEY).ok().flatten();

        tracing::info!(
            mode = %mode,
            remote = remote_config.as_ref().map(|c| c.display_name.as_str()).unwrap_or("-"),
            "Connection state loaded"
        );

        let state = ManagerState {
            mode,
            remote_config,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            consecutive_failures: 0,
            auth_ban_until: None,
            reconnect: ReconnectSlot::default(),
            persistence_warning: None,
            reconnect_request,
            writes: (0, 0),
        };
        let (snapshots, _) = watch::channel(state.snapshot(Instant::now()));

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                credentials,
                preferences,
                backoff,
                auth_ban,
                snapshots,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock, then publish the resulting snapshot.
    ///
    /// The persistence warning clears once an operation writes without failure.
    fn mutate<R>(&self, f: impl FnOnce(&Inner, &mut ManagerState) -> R) -> R {
        let mut state = self.lock();
        state.writes = (0, 0);
        let result = f(&*self.inner, &mut *state);
        if state.writes.0 > 0 && state.writes.1 == 0 {
            state.persistence_warning = None;
        }
        self.inner.snapshots.send_replace(state.snapshot(Instant::now()));
        result
    }

    // --- Mode ---

    pub fn set_mode(&self, mode: ConnectionMode) {
        self.mutate(|inner, state| inner.set_mode(state, mode));
    }

    pub fn switch_to_local(&self) {
        self.set_mode(ConnectionMode::Local);
    }

    /// Persist `config`, store its management key, then enter remote mode.
    pub fn switch_to_remote(&self, config: RemoteConnectionConfig, management_key: &str) {
        self.mutate(|inner, state| {
            let result = inner.credentials.save(config.id(), management_key);
            state.record("management key", result);
            inner.save_remote_config(state, config);
            inner.set_mode(state, ConnectionMode::Remote);
        });
    }

    // --- Remote config ---

    pub fn save_remote_config(&self, config: RemoteConnectionConfig) {
        self.mutate(|inner, state| inner.save_remote_config(state, config));
    }

    /// Replace the supplied fields of the current config. No-op without one.
    pub fn update_remote_config(&self, update: &RemoteConfigUpdate) {
        self.mutate(|inner, state| {
            let Some(current) = &state.remote_config else {
                tracing::debug!("No remote config to update");
                return;
            };
            let updated = current.updated(update);
            inner.save_remote_config(state, updated);
        });
    }

    /// Overwrite the key for the current config. No-op without one.
    pub fn update_management_key(&self, key: &str) {
        self.mutate(|inner, state| {
            let Some(config) = &state.remote_config else {
                tracing::debug!("No remote config for management key");
                return;
            };
            let result = inner.credentials.save(config.id(), key);
            state.record("management key", result);
        });
    }

    /// Drop the remote config and its key; fall back to local mode if remote.
    pub fn clear_remote_config(&self) {
        self.mutate(|inner, state| {
            if let Some(config) = state.remote_config.take() {
                let result = inner.credentials.delete(config.id());
                state.record("management key", result);
                tracing::info!(config_id = config.id(), "Remote config cleared");
            }
            let result = inner.preferences.remove(REMOTE_CONFIG_KEY);
            state.record("remote config", result);

            if state.mode == ConnectionMode::Remote {
                inner.set_mode(state, ConnectionMode::Local);
            }
        });
    }

    // --- Status ---

    /// Record a successful connection and clear all failure state.
    pub fn mark_connected(&self) {
        self.mutate(|inner, state| inner.mark_connected(state));
    }

    /// Report a status change. Errors count toward the ban; `Connected`
    /// behaves like [`mark_connected`](Self::mark_connected).
    pub fn set_connection_status(&self, status: ConnectionStatus) {
        self.mutate(|inner, state| match status {
            ConnectionStatus::Connected => inner.mark_connected(state),
            ConnectionStatus::Error(message) => inner.record_failure(state, message),
            other => {
                state.reconnect.cancel();
                tracing::debug!(status = %other, "Connection status changed");
                state.status = other;
            }
        });
    }

    // --- Auto-reconnect ---

    /// Run `on_reconnect` after the backoff delay for the next attempt.
    ///
    /// Any previously scheduled reconnect is cancelled first. The action is
    /// skipped if it is cancelled or the status became `Connected` before the
    /// delay elapses. The action is expected to report its outcome through
    /// [`set_connection_status`](Self::set_connection_status).
    ///
    /// A refusal is reported like any other error status, so it counts as a
    /// failure. It never re-enters or extends an active ban.
    pub fn schedule_auto_reconnect<F, Fut>(&self, on_reconnect: F) -> ScheduleOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.mutate(|inner, state| {
            state.reconnect.cancel();
            let now = Instant::now();

            if auth_ban::is_banned(now, state.auth_ban_until) {
                let remaining = auth_ban::remaining(now, state.auth_ban_until);
                let message = format!(
                    "Connection blocked after repeated authentication failures ({}m remaining)",
                    remaining.as_secs() / 60
                );
                tracing::warn!(remaining_secs = remaining.as_secs(), "Auto-reconnect refused: auth ban active");
                inner.record_failure(state, message);
                return ScheduleOutcome::Banned { remaining };
            }

            if inner.auth_ban.requires_manual_reset(state.consecutive_failures) {
                tracing::warn!(
                    failures = state.consecutive_failures,
                    "Auto-reconnect refused: too many consecutive failures"
                );
                inner.record_failure(
                    state,
                    "Too many consecutive connection failures. Reconnect manually to resume.".to_string(),
                );
                return ScheduleOutcome::TooManyFailures {
                    failures: state.consecutive_failures,
                };
            }

            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                tracing::error!("Auto-reconnect requires a Tokio runtime");
                return ScheduleOutcome::NoRuntime;
            };

            let delay = inner.backoff.delay(state.consecutive_failures.saturating_add(1));
            let (generation, cancelled) = state.reconnect.install();
            tracing::info!(
                delay_secs = delay.as_secs(),
                attempt = state.consecutive_failures.saturating_add(1),
                "Auto-reconnect scheduled"
            );

            runtime.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled => return,
                }
                let Some(inner) = weak.upgrade() else { return };
                let manager = ConnectionManager { inner };
                if manager.begin_reconnect(generation) {
                    on_reconnect().await;
                }
            });

            ScheduleOutcome::Scheduled { delay }
        })
    }

    /// Wake-time check: still the current schedule and not already connected.
    fn begin_reconnect(&self, generation: u64) -> bool {
        self.mutate(|_, state| {
            if !state.reconnect.take_if_current(generation) {
                return false;
            }
            if state.status.is_connected() {
                tracing::debug!("Skipping auto-reconnect: already connected");
                return false;
            }
            state.status = ConnectionStatus::Connecting;
            true
        })
    }

    /// Cancel the pending reconnect, if any. Does not wait for a running action.
    pub fn cancel_auto_reconnect(&self) {
        self.mutate(|_, state| {
            if state.reconnect.cancel() {
                tracing::debug!("Auto-reconnect cancelled");
            }
        });
    }

    /// Clear failures and ban, and cancel any pending reconnect.
    pub fn reset_failure_counters(&self) {
        self.mutate(|_, state| {
            state.consecutive_failures = 0;
            state.auth_ban_until = None;
            state.reconnect.cancel();
            tracing::info!("Failure counters reset");
        });
    }

    /// Manual reconnect: reset counters, go `Disconnected` and record a
    /// request token so other processes sharing the store follow suit.
    pub fn request_reconnect(&self) {
        self.mutate(|inner, state| {
            let token = uuid::Uuid::new_v4().to_string();
            let result = inner.preferences.set(RECONNECT_REQUEST_KEY, &token);
            state.record("reconnect request", result);
            state.reconnect_request = Some(token);
            inner.manual_reset(state);
            tracing::info!("Manual reconnect requested");
        });
    }

    /// Pick up mode, remote config and reconnect requests written to the
    /// preference store by another process. Returns whether anything changed.
    ///
    /// A new mode or connection target, or a new reconnect request, leaves
    /// the manager `Disconnected` with counters reset. Unreadable stores
    /// keep the current state.
    pub fn reload_persisted(&self) -> bool {
        self.mutate(|inner, state| {
            let (mode, config, request) = match read_stored(inner.preferences.as_ref()) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not reload connection state; keeping current");
                    return false;
                }
            };
            let mode = parse_mode(mode);
            let config = parse_remote_config(config);

            let mode_changed = mode != state.mode;
            let target_changed = match (&state.remote_config, &config) {
                (Some(current), Some(stored)) => !current.same_target(stored),
                (None, None) => false,
                _ => true,
            };
            let requested = request.is_some() && request != state.reconnect_request;
            if !mode_changed && !requested && config == state.remote_config {
                return false;
            }

            tracing::info!(
                mode = %mode,
                mode_changed,
                target_changed,
                requested,
                "Connection state changed on disk"
            );
            state.mode = mode;
            state.remote_config = config;
            state.reconnect_request = request;
            if mode_changed || requested || (target_changed && mode == ConnectionMode::Remote) {
                inner.manual_reset(state);
            }
            true
        })
    }

    /// See [`friendly_error_message`](crate::resilience::friendly_error_message).
    pub fn friendly_error_message(raw: &str) -> String {
        friendly_error_message(raw)
    }

    // --- Reads ---

    pub fn connection_mode(&self) -> ConnectionMode {
        self.lock().mode
    }

    pub fn is_remote_mode(&self) -> bool {
        self.connection_mode() == ConnectionMode::Remote
    }

    pub fn is_local_mode(&self) -> bool {
        self.connection_mode() == ConnectionMode::Local
    }

    pub fn remote_config(&self) -> Option<RemoteConnectionConfig> {
        self.lock().remote_config.clone()
    }

    pub fn has_valid_remote_config(&self) -> bool {
        self.lock().remote_config.as_ref().is_some_and(|c| c.is_valid())
    }

    /// Management key of the current remote config.
    pub fn remote_management_key(&self) -> Option<String> {
        let config_id = self.lock().remote_config.as_ref()?.id().to_string();
        match self.inner.credentials.get(&config_id) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(config_id = %config_id, error = %e, "Failed to read management key");
                None
            }
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().status.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn is_auth_banned(&self) -> bool {
        auth_ban::is_banned(Instant::now(), self.lock().auth_ban_until)
    }

    pub fn auth_ban_time_remaining(&self) -> Duration {
        auth_ban::remaining(Instant::now(), self.lock().auth_ban_until)
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.lock().reconnect.is_pending()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.lock().snapshot(Instant::now())
    }

    /// Receiver that observes a new snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.snapshots.subscribe()
    }
}

impl Inner {
    fn set_mode(&self, state: &mut ManagerState, mode: ConnectionMode) {
        let result = self.preferences.set(CONNECTION_MODE_KEY, mode.as_str());
        state.record("connection mode", result);
        state.reconnect.cancel();
        state.mode = mode;
        state.status = ConnectionStatus::Disconnected;
        state.last_error = None;
        tracing::info!(mode = %mode, "Connection mode set");
    }

    fn save_remote_config(&self, state: &mut ManagerState, config: RemoteConnectionConfig) {
        let result = serde_json::to_string(&config)
            .map_err(StoreError::from)
            .and_then(|json| self.preferences.set(REMOTE_CONFIG_KEY, &json));
        state.record("remote config", result);
        tracing::debug!(config_id = config.id(), endpoint = %config.endpoint_url, "Remote config saved");
        state.remote_config = Some(config);
    }

    fn mark_connected(&self, state: &mut ManagerState) {
        state.reconnect.cancel();
        state.status = ConnectionStatus::Connected;
        state.last_error = None;
        state.consecutive_failures = 0;
        state.auth_ban_until = None;

        if let Some(config) = &state.remote_config {
            let updated = config.connected_at(now_epoch_secs());
            self.save_remote_config(state, updated);
        }
        tracing::info!(mode = %state.mode, "Connected");
    }

    fn manual_reset(&self, state: &mut ManagerState) {
        state.reconnect.cancel();
        state.consecutive_failures = 0;
        state.auth_ban_until = None;
        state.status = ConnectionStatus::Disconnected;
        state.last_error = None;
    }

    fn record_failure(&self, state: &mut ManagerState, message: String) {
        state.reconnect.cancel();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if let Some(until) = self.auth_ban.ban_entry(state.consecutive_failures, Instant::now()) {
            state.auth_ban_until = Some(until);
            tracing::warn!(
                failures = state.consecutive_failures,
                ban_secs = self.auth_ban.duration().as_secs(),
                "Auth ban entered"
            );
        }

        tracing::warn!(failures = state.consecutive_failures, error = %message, "Connection failed");
        state.last_error = Some(message.clone());
        state.status = ConnectionStatus::Error(message);
    }
}

fn load_mode(preferences: &dyn PreferenceStore) -> ConnectionMode {
    match preferences.get(CONNECTION_MODE_KEY) {
        Ok(raw) => parse_mode(raw),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read connection mode");
            ConnectionMode::Local
        }
    }
}

fn load_remote_config(preferences: &dyn PreferenceStore) -> Option<RemoteConnectionConfig> {
    match preferences.get(REMOTE_CONFIG_KEY) {
        Ok(raw) => parse_remote_config(raw),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read remote config");
            None
        }
    }
}

/// Raw mode, remote config and reconnect request, in one pass.
fn read_stored(
    preferences: &dyn PreferenceStore,
) -> Result<(Option<String>, Option<String>, Option<String>), StoreError> {
    Ok((
        preferences.get(CONNECTION_MODE_KEY)?,
        preferences.get(REMOTE_CONFIG_KEY)?,
        preferences.get(RECONNECT_REQUEST_KEY)?,
    ))
}

fn parse_mode(raw: Option<String>) -> ConnectionMode {
    let Some(raw) = raw else {
        return ConnectionMode::Local;
    };
    raw.parse().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring stored connection mode");
        ConnectionMode::Local
    })
}

fn parse_remote_config(raw: Option<String>) -> Option<RemoteConnectionConfig> {
    serde_json::from_str(&raw?)
        .map_err(|e| tracing::warn!(error = %e, "Ignoring malformed remote config"))
        .ok()
}
