//! End-to-end reconnect behaviour against a mock management API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proxy_connect::config::AppConfig;
use proxy_connect::resilience::ErrorKind;
use proxy_connect::storage::PreferencesWatcher;
use proxy_connect::supervisor::StatusFile;
use proxy_connect::{ConnectionMode, ConnectionStatus, RemoteConnectionConfig, Shutdown, Supervisor};

mod common;

fn app_config(endpoint: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.local.endpoint_url = endpoint;
    config.local.timeout_secs = 5;
    config
}

#[tokio::test]
async fn test_local_connect_succeeds() {
    let addr = common::start_programmable_backend(|_| async { (200, "{\"debug\":false}".into()) }).await;
    let manager = common::fast_manager(5, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));

    supervisor.attempt().await.expect("local proxy should be reachable");
    assert_eq!(manager.connection_status(), ConnectionStatus::Connected);
    assert_eq!(manager.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_remote_key_is_sent_and_checked() {
    let addr = common::start_programmable_backend(|auth| async move {
        if auth.as_deref() == Some("Bearer good-key") {
            (200, "{}".into())
        } else {
            (401, "{\"error\":\"unauthorized\"}".into())
        }
    })
    .await;

    let manager = common::fast_manager(5, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config("http://127.0.0.1:1".into()));
    manager.switch_to_remote(RemoteConnectionConfig::new(format!("http://{addr}"), "Mock"), "bad-key");

    assert!(supervisor.attempt().await.is_err());
    assert_eq!(manager.consecutive_failures(), 1);
    assert_eq!(manager.last_error().as_deref(), ErrorKind::Unauthorized.message());

    manager.update_management_key("good-key");
    supervisor.attempt().await.expect("good key should be accepted");
    assert_eq!(manager.consecutive_failures(), 0);
    assert!(manager.remote_config().unwrap().last_connected.is_some());
}

#[tokio::test]
async fn test_refused_connection_is_classified() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = common::fast_manager(5, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));

    assert!(supervisor.attempt().await.is_err());
    assert_eq!(manager.last_error().as_deref(), ErrorKind::ConnectionRefused.message());
}

#[tokio::test]
async fn test_reconnect_cycle_recovers_after_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let addr = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "{}".into())
            }
        }
    })
    .await;

    let manager = common::fast_manager(5, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));

    supervisor.clone().reconnect_cycle().await;
    let snapshot = common::wait_for(&manager, |s| s.status == ConnectionStatus::Connected).await;

    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_ban_stops_reconnect_cycle() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let addr = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (500, "boom".into())
        }
    })
    .await;

    let manager = common::fast_manager(2, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));

    supervisor.clone().reconnect_cycle().await;
    let snapshot = common::wait_for(&manager, |s| {
        s.auth_banned
            && !s.reconnect_scheduled
            && s.last_error.as_deref().is_some_and(|e| e.contains("blocked"))
    })
    .await;
    // Two probe failures plus the refused schedule.
    assert_eq!(snapshot.consecutive_failures, 3);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!manager.is_reconnect_scheduled());
}

#[tokio::test]
async fn test_failure_limit_requires_manual_reset() {
    let addr = common::start_programmable_backend(|_| async { (503, "down".into()) }).await;

    // Ban threshold above the limit so only the hard stop applies.
    let manager = common::fast_manager(100, 3);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));

    supervisor.clone().reconnect_cycle().await;
    let snapshot = common::wait_for(&manager, |s| {
        s.consecutive_failures == 4 && !s.reconnect_scheduled
            && s.last_error.as_deref().is_some_and(|e| e.starts_with("Too many"))
    })
    .await;
    assert!(!snapshot.auth_banned);

    manager.reset_failure_counters();
    assert_eq!(manager.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_supervisor_runs_until_shutdown() {
    let addr = common::start_programmable_backend(|_| async { (200, "{}".into()) }).await;
    let dir = tempfile::tempdir().unwrap();
    let status = StatusFile::new(dir.path().join("status.json"));
    let manager = common::fast_manager(5, 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")))
        .with_status_file(status.clone());

    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe(), None));

    common::wait_for(&manager, |s| s.status == ConnectionStatus::Connected).await;
    let published = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(published) = status.read().ok().flatten() {
                if published.snapshot.status == ConnectionStatus::Connected {
                    return published;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("status file should show the connection");
    assert_eq!(published.pid, std::process::id());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor should stop")
        .unwrap();
    assert_eq!(status.read().unwrap(), None);
}

#[tokio::test]
async fn test_supervisor_retries_when_ban_expires() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let addr = common::start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (500, "boom".into())
            } else {
                (200, "{}".into())
            }
        }
    })
    .await;

    let manager = common::manager_with_ban(2, Duration::from_millis(300), 10);
    let supervisor = Supervisor::new(manager.clone(), &app_config(format!("http://{addr}")));
    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe(), None));

    common::wait_for(&manager, |s| s.auth_banned).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let snapshot = common::wait_for(&manager, |s| s.status == ConnectionStatus::Connected).await;
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_daemon_follows_changes_from_another_process() {
    let addr = common::start_programmable_backend(|auth| async move {
        if auth.as_deref() == Some("Bearer remote-key") {
            (200, "{}".into())
        } else {
            (401, "unauthorized".into())
        }
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    // Local proxy is down, so the daemon starts out failing.
    let daemon = common::file_manager(dir.path());
    let supervisor = Supervisor::new(daemon.clone(), &app_config("http://127.0.0.1:1".into()));
    let (watcher, store_changes) = PreferencesWatcher::new(&dir.path().join("preferences.json"));
    let _watch = watcher.run().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe(), Some(store_changes)));
    common::wait_for(&daemon, |s| s.consecutive_failures >= 1).await;

    let editor = common::file_manager(dir.path());
    editor.switch_to_remote(RemoteConnectionConfig::new(format!("http://{addr}"), "Mock"), "remote-key");

    let snapshot = common::wait_for(&daemon, |s| {
        s.mode == ConnectionMode::Remote && s.status == ConnectionStatus::Connected
    })
    .await;
    assert_eq!(
        snapshot.remote_config.as_ref().map(|c| c.id().to_string()),
        editor.remote_config().map(|c| c.id().to_string())
    );
    assert_eq!(snapshot.consecutive_failures, 0);

    shutdown.trigger();
    task.await.unwrap();
}
