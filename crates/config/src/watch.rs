//! File watching for automatic configuration reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ConfigError;
use crate::store::ConfigStore;

/// Quiet period after the last file event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Reloads a [`ConfigStore`] whenever its file is written.
///
/// The parent directory is watched rather than the file itself so that
/// editors which replace the file by rename are still noticed. Dropping
/// the watcher stops both the OS watch and the reload task.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching the file backing `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<ConfigStore>) -> Result<Self, ConfigError> {
        let Some(path) = store.path().map(Path::to_path_buf) else {
            return Err(ConfigError::invalid(
                "configuration store has no backing file",
                "load the store with ConfigStore::load to enable watching",
            ));
        };

        let file_name = path.file_name().map(|n| n.to_os_string());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_)
                    ) && event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Configuration watch error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(path = %path.display(), "Watching configuration file for changes");

        let task = tokio::spawn(reload_loop(store, rx));
        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reload_loop(store: Arc<ConfigStore>, mut rx: mpsc::UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
        // Collapse bursts of events from a single save.
        loop {
            match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                Ok(Some(())) => trace!("Coalescing configuration file event"),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        debug!("Configuration file changed, reloading");
        // Failures are logged by the store and leave the old config active.
        if let Err(e) = store.reload() {
            debug!(error = %e, "Keeping previous configuration");
        }
    }
}
