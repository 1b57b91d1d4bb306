//! The bundler contract and rebuild-state threading.
//!
//! A bundler is invoked once per build cycle. It receives the state it
//! returned last time (nothing on the first cycle) and hands back a new one
//! alongside its outputs. The runner never looks inside that state: it
//! parks it in a [`RebuildSlot`] between cycles and moves it into the next
//! invocation.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::output::{AssetCopyEntry, OutputFile};

/// A bundling collaborator.
///
/// `invoke` must depend only on the bundler's configuration, the previous
/// state and the current source tree. The runner guarantees it is never
/// called concurrently.
///
/// Compilation problems (syntax errors, unresolved imports) belong in an
/// `Ok` invocation with `success == false`. Returning `Err` means the
/// bundler itself could not run, and ends the session.
#[async_trait]
pub trait Bundler: Send {
    /// Incremental caches carried from one invocation to the next.
    type State: Send + 'static;

    async fn invoke(
        &mut self,
        previous: Option<Self::State>,
        cancel: CancellationToken,
    ) -> Result<Invocation<Self::State>>;
}

/// Everything a single bundling pass returns.
#[derive(Debug, Clone)]
pub struct Invocation<S> {
    pub success: bool,
    pub output_files: Vec<OutputFile>,
    pub asset_files: Vec<AssetCopyEntry>,
    pub diagnostics: Vec<Diagnostic>,
    /// Source files this pass read. Changes to them trigger a rebuild.
    pub watch_files: Vec<PathBuf>,
    pub state: S,
}

impl<S> Invocation<S> {
    /// A successful pass producing `output_files`.
    pub fn succeeded(output_files: Vec<OutputFile>, state: S) -> Self {
        Self {
            success: true,
            output_files,
            asset_files: Vec::new(),
            diagnostics: Vec::new(),
            watch_files: Vec::new(),
            state,
        }
    }

    /// A pass that failed with `diagnostics`.
    pub fn failed(diagnostics: Vec<Diagnostic>, state: S) -> Self {
        Self {
            success: false,
            output_files: Vec::new(),
            asset_files: Vec::new(),
            diagnostics,
            watch_files: Vec::new(),
            state,
        }
    }

    pub fn with_assets(mut self, asset_files: Vec<AssetCopyEntry>) -> Self {
        self.asset_files = asset_files;
        self
    }

    pub fn with_watch_files(mut self, watch_files: Vec<PathBuf>) -> Self {
        self.watch_files = watch_files;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Single owner of a session's rebuild state.
///
/// The state is moved out with [`take`](Self::take) for the duration of an
/// invocation and put back with [`replace`](Self::replace). It is never
/// cloned or shared, so two invocations cannot observe the same state.
#[derive(Debug)]
pub struct RebuildSlot<S> {
    state: Option<S>,
    checked_out: bool,
    generation: u64,
}

impl<S> Default for RebuildSlot<S> {
    fn default() -> Self {
        Self {
            state: None,
            checked_out: false,
            generation: 0,
        }
    }
}

impl<S> RebuildSlot<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the state out for an invocation. `None` before the first
    /// invocation has completed.
    pub fn take(&mut self) -> Option<S> {
        debug_assert!(!self.checked_out, "rebuild state taken twice");
        self.checked_out = true;
        self.state.take()
    }

    /// Store the state returned by the invocation, replacing the old one.
    pub fn replace(&mut self, state: S) {
        self.checked_out = false;
        self.state = Some(state);
        self.generation += 1;
    }

    /// Drop the state after an invocation was abandoned.
    pub fn discard(&mut self) {
        self.checked_out = false;
        self.state = None;
    }

    /// Number of completed invocations that stored a state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFileType;

    #[test]
    fn test_slot_starts_empty() {
        let mut slot: RebuildSlot<u32> = RebuildSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_slot_threads_state() {
        let mut slot = RebuildSlot::new();
        assert_eq!(slot.take(), None);
        slot.replace(vec!["a.ts"]);

        let previous = slot.take().unwrap();
        assert!(slot.is_empty());
        slot.replace([previous, vec!["b.ts"]].concat());

        assert_eq!(slot.generation(), 2);
        assert_eq!(slot.take(), Some(vec!["a.ts", "b.ts"]));
    }

    #[test]
    fn test_discard_resets_state() {
        let mut slot = RebuildSlot::new();
        slot.take();
        slot.replace(1u8);
        slot.take();
        slot.discard();
        assert!(slot.is_empty());
        assert_eq!(slot.take(), None);
    }

    #[test]
    #[should_panic(expected = "rebuild state taken twice")]
    #[cfg(debug_assertions)]
    fn test_double_take_panics_in_debug() {
        let mut slot: RebuildSlot<u8> = RebuildSlot::new();
        slot.take();
        slot.take();
    }

    #[test]
    fn test_invocation_builders() {
        let ok = Invocation::succeeded(
            vec![OutputFile::new("index.html", "", OutputFileType::Browser)],
            (),
        )
        .with_watch_files(vec![PathBuf::from("/src/main.ts")]);
        assert!(ok.success);
        assert_eq!(ok.watch_files.len(), 1);

        let failed = Invocation::failed(vec![Diagnostic::error("boom")], ());
        assert!(!failed.success);
        assert!(failed.output_files.is_empty());
        assert_eq!(failed.diagnostics.len(), 1);
    }
}
