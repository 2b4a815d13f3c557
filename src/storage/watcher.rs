//! Preference file watcher for state written by other processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Signals whenever the preference file is created, rewritten or removed.
///
/// Stores replace the file by renaming a temp file over it, so the parent
/// directory is watched and events are filtered by file name.
pub struct PreferencesWatcher {
    path: PathBuf,
    changed_tx: mpsc::UnboundedSender<()>,
}

impl PreferencesWatcher {
    /// Returns the watcher and a receiver that yields one `()` per change event.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (changed_tx, changed_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                changed_tx,
            },
            changed_rx,
        )
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = watch_dir(&self.path);
        std::fs::create_dir_all(&dir).map_err(notify::Error::io)?;

        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let tx = self.changed_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some() && p.file_name() == file_name.as_deref());
                    let kind = &event.kind;
                    if touches_file && (kind.is_modify() || kind.is_create() || kind.is_remove()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Preferences watch error"),
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Preferences watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::preferences::{JsonFilePreferences, PreferenceStore, CONNECTION_MODE_KEY};
    use std::time::Duration;

    #[test]
    fn test_watch_dir_of_bare_file_name() {
        assert_eq!(watch_dir(Path::new("prefs.json")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/tmp/pc/prefs.json")), PathBuf::from("/tmp/pc"));
    }

    #[tokio::test]
    async fn test_signals_on_store_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        let (watcher, mut changes) = PreferencesWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        JsonFilePreferences::new(&path).set(CONNECTION_MODE_KEY, "remote").unwrap();

        tokio::time::timeout(Duration::from_secs(10), changes.recv())
            .await
            .expect("no change event")
            .expect("watcher closed");
    }

    #[tokio::test]
    async fn test_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, mut changes) = PreferencesWatcher::new(&dir.path().join("preferences.json"));
        let _handle = watcher.run().unwrap();

        std::fs::write(dir.path().join("status.json"), "{}").unwrap();
        let received = tokio::time::timeout(Duration::from_millis(500), changes.recv()).await;
        assert!(received.is_err(), "unexpected change event");
    }
}
