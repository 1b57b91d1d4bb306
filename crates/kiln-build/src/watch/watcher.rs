//! Filesystem watcher backed by `notify`.
//!
//! The project root is watched recursively. Declared inputs that live
//! outside of it (workspace libraries, shared configs) get their parent
//! directory watched non-recursively; those extra watches follow the inputs
//! of each build and are dropped when no longer needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use super::{ChangeBatch, ChangeFilter, ChangeSource, FileChange, WatchPolicy, debounce};
use crate::{Error, Result};

/// Native or polling file watcher with debouncing and relevance filtering.
pub struct FileWatcher {
    /// Underlying notify watcher; `None` once closed.
    watcher: Option<Box<dyn Watcher + Send>>,
    rx: mpsc::UnboundedReceiver<FileChange>,
    filter: ChangeFilter,
    debounce: Duration,
    /// Extra non-recursive watches outside the project root.
    external_dirs: FxHashSet<PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.filter.project_root())
            .field("active", &self.watcher.is_some())
            .field("external_dirs", &self.external_dirs)
            .finish()
    }
}

impl FileWatcher {
    /// Start watching `project_root`.
    ///
    /// With `poll` set, the tree is scanned on that interval instead of
    /// relying on native events (useful on network filesystems and in some
    /// containers).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the root does not exist or the watcher
    /// cannot be created.
    pub fn new(
        project_root: &Path,
        output_path: &Path,
        ignored_paths: Vec<PathBuf>,
        policy: &WatchPolicy,
        poll: Option<Duration>,
    ) -> Result<Self> {
        if !project_root.exists() {
            return Err(Error::Watch(
                notify::Error::path_not_found().add_path(project_root.to_path_buf()),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in convert_event(event) {
                    // Receiver gone means the session ended.
                    let _ = tx.send(change);
                }
            }
            Err(e) => tracing::warn!("File watcher error: {}", e),
        };

        let mut watcher: Box<dyn Watcher + Send> = match poll {
            Some(interval) => {
                tracing::debug!("Polling for changes every {}ms", interval.as_millis());
                let config = notify::Config::default().with_poll_interval(interval);
                Box::new(PollWatcher::new(handler, config)?)
            }
            None => Box::new(notify::recommended_watcher(handler)?),
        };
        watcher.watch(project_root, RecursiveMode::Recursive)?;

        Ok(Self {
            watcher: Some(watcher),
            rx,
            filter: ChangeFilter::new(project_root, output_path, ignored_paths, policy),
            debounce: policy.debounce,
            external_dirs: FxHashSet::default(),
        })
    }

    /// Get the root directory being watched.
    pub fn root(&self) -> &Path {
        self.filter.project_root()
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

#[async_trait]
impl ChangeSource for FileWatcher {
    fn subscribe(&mut self, inputs: &[PathBuf]) -> Result<()> {
        self.filter.set_inputs(inputs);

        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };

        let root = self.filter.project_root().to_path_buf();
        let wanted: FxHashSet<PathBuf> = self
            .filter
            .inputs()
            .filter(|input| !input.starts_with(&root))
            .filter_map(|input| input.parent().map(Path::to_path_buf))
            .collect();

        for stale in self.external_dirs.difference(&wanted) {
            // Already-deleted directories fail to unwatch; nothing to release.
            let _ = watcher.unwatch(stale);
        }
        for dir in wanted.difference(&self.external_dirs) {
            if dir.exists() {
                watcher.watch(dir, RecursiveMode::NonRecursive)?;
            }
        }
        self.external_dirs = wanted;
        Ok(())
    }

    async fn next_batch(&mut self) -> Option<ChangeBatch> {
        self.watcher.as_ref()?;
        let filter = &self.filter;
        debounce(&mut self.rx, |change| filter.is_relevant(change), self.debounce).await
    }

    fn close(&mut self) {
        if self.watcher.take().is_some() {
            tracing::debug!("Stopped watching {}", self.filter.project_root().display());
        }
        self.external_dirs.clear();
        self.rx.close();
    }
}

/// Convert a notify event to our change type. Access events are dropped.
fn convert_event(event: Event) -> Vec<FileChange> {
    let make: fn(PathBuf) -> FileChange = match event.kind {
        EventKind::Create(_) => FileChange::Created,
        EventKind::Modify(_) => FileChange::Modified,
        EventKind::Remove(_) => FileChange::Removed,
        _ => return Vec::new(),
    };
    event.paths.into_iter().map(make).collect()
}
