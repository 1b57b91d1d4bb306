//! Change notifications that drive rebuilds in watch mode.
//!
//! A [`ChangeSource`] is subscribed to the inputs of the last build and
//! yields debounced [`ChangeBatch`]es. Two sources ship with the crate:
//!
//! - [`FileWatcher`]: native filesystem events via `notify`, or a polling
//!   watcher when a poll interval is configured
//! - [`ChannelChangeSource`]: changes pushed through a channel, for embedders
//!   that already run their own watcher and for tests
//!
//! # Debouncing
//!
//! Editors tend to emit several events per save (truncate, write, chmod,
//! rename). After the first relevant event, a source keeps collecting until
//! no further relevant event arrives for [`WatchPolicy::debounce`]; the whole burst
//! becomes one batch and triggers one rebuild.

mod channel;
mod filter;
mod watcher;

pub use channel::{ChangeSender, ChannelChangeSource};
pub use filter::ChangeFilter;
pub use watcher::FileWatcher;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::Result;

/// Default quiet period that ends a burst of change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    /// Created or removed, as opposed to modified in place.
    pub fn is_structural(&self) -> bool {
        matches!(self, FileChange::Created(_) | FileChange::Removed(_))
    }
}

/// A debounced burst of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: Vec<FileChange>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change, replacing any earlier change to the same path.
    pub fn push(&mut self, change: FileChange) {
        self.changes.retain(|existing| existing.path() != change.path());
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.changes.iter().map(FileChange::path)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<FileChange> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = FileChange>>(iter: I) -> Self {
        let mut batch = ChangeBatch::new();
        for change in iter {
            batch.push(change);
        }
        batch
    }
}

/// Which changed paths are allowed to trigger a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Relevance {
    /// Files the last build declared as inputs, plus files created or removed
    /// inside the project root. Falls back to `ProjectTree` when the last
    /// build declared no inputs.
    #[default]
    DeclaredInputs,
    /// Anything inside the project root.
    ProjectTree,
}

/// Tunables for watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPolicy {
    pub debounce: Duration,
    pub relevance: Relevance,
    /// Path patterns relative to the project root that never trigger a
    /// rebuild: `"node_modules"` matches a directory anywhere, `"*.log"`
    /// matches a suffix.
    pub ignore: Vec<String>,
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            relevance: Relevance::default(),
            ignore: vec!["node_modules".to_string()],
        }
    }
}

/// Source of change notifications for a watch session.
#[async_trait]
pub trait ChangeSource: Send {
    /// Point the source at the inputs of the build that just finished.
    ///
    /// Called after every invocation, before waiting for the next batch.
    fn subscribe(&mut self, inputs: &[PathBuf]) -> Result<()>;

    /// Wait for the next relevant, debounced batch.
    ///
    /// Returns `None` once the source is closed or its event stream ended.
    async fn next_batch(&mut self) -> Option<ChangeBatch>;

    /// Stop watching and release OS handles. Idempotent.
    fn close(&mut self);
}

/// Receive changes until a burst is over.
///
/// Waits for the first change accepted by `relevant`, then keeps receiving
/// until `window` passes without another relevant change. Irrelevant events
/// are dropped and do not move the deadline.
/// Returns `None` if the channel closes before a relevant change arrives.
pub(crate) async fn debounce(
    rx: &mut mpsc::UnboundedReceiver<FileChange>,
    relevant: impl Fn(&FileChange) -> bool,
    window: Duration,
) -> Option<ChangeBatch> {
    let mut batch = ChangeBatch::new();

    loop {
        let change = rx.recv().await?;
        if relevant(&change) {
            batch.push(change);
            break;
        }
        tracing::trace!(path = %change.path().display(), "Ignoring change");
    }

    let mut deadline = Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(change)) => {
                if relevant(&change) {
                    batch.push(change);
                    deadline = Instant::now() + window;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch)
}
