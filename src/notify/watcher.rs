//! Reload trigger fired by config file changes.

use super::TriggerSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Trigger that fires whenever the watched config file is modified or replaced.
///
/// Events are forwarded one for one; there is no debouncing, so an editor
/// that writes a file in several steps causes several reloads.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_flags::notify::{FileChangeTrigger, TriggerSource};
///
/// # async fn example() -> hotswap_flags::error::Result<()> {
/// let mut trigger = FileChangeTrigger::new("/etc/myapp.conf")?;
/// while trigger.next_trigger().await.is_some() {
///     println!("config file changed");
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileChangeTrigger {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    path: PathBuf,
    events: mpsc::UnboundedReceiver<()>,
}

impl FileChangeTrigger {
    /// Start watching `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TriggerError` if the path cannot be resolved or watched.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().canonicalize().map_err(|e| {
            ConfigError::TriggerError(format!(
                "Failed to resolve path {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::TriggerError(format!("{} has no parent directory", path.display())))?;

        // Watching the directory keeps working when the file is replaced by a rename.
        let target = path.clone();
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                    ) && event.paths.iter().any(|p| p == &target);
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "config file watch error"),
            }
        })
        .map_err(|e| ConfigError::TriggerError(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::TriggerError(format!("Failed to watch path: {}", e)))?;

        tracing::info!(path = %path.display(), "config file watcher started");
        Ok(Self {
            _watcher: watcher,
            path,
            events,
        })
    }

    /// The canonical path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TriggerSource for FileChangeTrigger {
    async fn next_trigger(&mut self) -> Option<()> {
        self.events.recv().await
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
