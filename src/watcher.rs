//! Spec file watcher for hot reload.
//!
//! Watches the spec file's directory (editors often replace files by
//! rename) and forwards one raw `()` event per relevant change. Debouncing
//! is left to the reload orchestrator.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Watches one spec file.
pub struct SpecWatcher {
    path: PathBuf,
    event_tx: mpsc::UnboundedSender<()>,
}

impl SpecWatcher {
    /// Create a watcher and the receiver its change events arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Start watching. Events stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = watch_directory(&self.path);
        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let tx = self.event_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        debug!(kind = ?event.kind, "Spec file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!(error = %e, "Spec watch error"),
            },
            Config::default(),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        info!(path = %self.path.display(), "Watching spec file for changes");
        Ok(watcher)
    }
}

fn watch_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
