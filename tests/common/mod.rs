//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use proxy_connect::connection::ConnectionSnapshot;
use proxy_connect::resilience::{AuthBanPolicy, BackoffPolicy};
use proxy_connect::storage::{FileCredentialStore, JsonFilePreferences, MemoryCredentialStore, MemoryPreferences};
use proxy_connect::ConnectionManager;

/// Start a mock management API. `f` receives the request's Authorization
/// header and returns the status code and body to send.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let auth = read_authorization(&mut socket).await;
                        let (status, body) = f(auth).await;
                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            403 => "403 Forbidden",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_authorization(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("authorization").then(|| value.trim().to_string())
        })
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(20), 4, Duration::from_millis(100))
}

/// A manager on in-memory stores with fast test policies.
pub fn fast_manager(ban_threshold: u32, max_failures: u32) -> ConnectionManager {
    manager_with_ban(ban_threshold, Duration::from_secs(60), max_failures)
}

pub fn manager_with_ban(ban_threshold: u32, ban: Duration, max_failures: u32) -> ConnectionManager {
    ConnectionManager::with_policies(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemoryPreferences::new()),
        fast_backoff(),
        AuthBanPolicy::new(ban_threshold, ban, max_failures),
    )
}

/// A manager on file stores under `dir`, as a separate process would open them.
pub fn file_manager(dir: &Path) -> ConnectionManager {
    ConnectionManager::with_policies(
        Arc::new(FileCredentialStore::new(dir.join("credentials.json"))),
        Arc::new(JsonFilePreferences::new(dir.join("preferences.json"))),
        fast_backoff(),
        AuthBanPolicy::new(5, Duration::from_secs(60), 10),
    )
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for<P>(manager: &ConnectionManager, pred: P) -> ConnectionSnapshot
where
    P: Fn(&ConnectionSnapshot) -> bool,
{
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if pred(&snapshot) {
                return snapshot;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timed out waiting for connection state")
}
