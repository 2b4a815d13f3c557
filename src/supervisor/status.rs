//! Status document the daemon publishes for other processes.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::connection::types::now_epoch_secs;
use crate::connection::ConnectionSnapshot;
use crate::storage::json_file::{read_json, write_json};
use crate::storage::StoreError;

/// Snapshot as last written by a running daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedStatus {
    pub pid: u32,
    /// Epoch seconds of the write.
    pub updated_at: u64,
    pub snapshot: ConnectionSnapshot,
}

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn publish(&self, snapshot: &ConnectionSnapshot) -> Result<(), StoreError> {
        let status = PublishedStatus {
            pid: std::process::id(),
            updated_at: now_epoch_secs(),
            snapshot: snapshot.clone(),
        };
        write_json(&self.path, &status, false)
    }

    /// Last published status; `None` when no daemon is running.
    pub fn read(&self) -> Result<Option<PublishedStatus>, StoreError> {
        read_json(&self.path)
    }

    /// Remove the document on daemon exit.
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionMode, ConnectionStatus};

    #[test]
    fn test_publish_read_clear() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::new(dir.path().join("status.json"));
        assert_eq!(status.read().unwrap(), None);

        let snapshot = ConnectionSnapshot {
            mode: ConnectionMode::Remote,
            status: ConnectionStatus::Error("Host not found".into()),
            consecutive_failures: 2,
            ..Default::default()
        };
        status.publish(&snapshot).unwrap();

        let published = status.read().unwrap().unwrap();
        assert_eq!(published.snapshot, snapshot);
        assert_eq!(published.pid, std::process::id());

        status.clear().unwrap();
        status.clear().unwrap();
        assert_eq!(status.read().unwrap(), None);
    }
}
