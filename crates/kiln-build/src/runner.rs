//! The build loop.
//!
//! [`BuildActionRunner`] drives a [`Bundler`] either once (single-shot) or
//! for the lifetime of a watch session, writes successful results to the
//! output directory and hands every result to the caller, one per
//! invocation, through a pull-based session.
//!
//! ```text
//!   Idle ──► Invoking ──► WritingBack ──► (yield) ──► Terminated      single-shot
//!                ▲                           │
//!                └──── AwaitingChange ◄──────┘                        watch
//!
//!   any phase ──(token fired)──► Cancelled
//! ```
//!
//! The caller controls pacing: nothing happens between two calls to
//! [`next`](BuildActionRunner::next). In watch mode, changes that arrive
//! while the caller is busy are buffered by the change source and coalesced
//! into the next batch.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::Stream;
use path_clean::PathClean;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Diagnostic;
use crate::output::{
    AssetCopyEntry, OutputFile, OutputTracker, WriteFilter, remove_output_files,
    write_output_files,
};
use crate::rebuild::{Bundler, Invocation, RebuildSlot};
use crate::watch::{ChangeBatch, ChangeSource, FileWatcher, WatchPolicy};
use crate::{Error, Result};

/// Configuration of one build session.
#[derive(Clone)]
pub struct RunnerConfig {
    /// Directory outputs are written to.
    pub output_path: PathBuf,
    pub project_root: PathBuf,
    /// Defaults to `project_root`.
    pub workspace_root: PathBuf,
    /// Keep rebuilding on source changes until cancelled.
    pub watch: bool,
    /// Poll the filesystem on this interval instead of using native events.
    pub poll: Option<Duration>,
    /// Empty the output directory before the first build.
    pub delete_output_path: bool,
    /// Persist successful results. When `false`, results are only yielded.
    pub write_to_file_system: bool,
    /// Files rejected by this predicate are not persisted.
    pub write_filter: Option<WriteFilter>,
    pub cancellation: CancellationToken,
    pub watch_policy: WatchPolicy,
    pub verbose: bool,
    /// Paths whose changes never trigger a rebuild (e.g. the cache directory).
    pub ignored_paths: Vec<PathBuf>,
}

impl std::fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("output_path", &self.output_path)
            .field("project_root", &self.project_root)
            .field("workspace_root", &self.workspace_root)
            .field("watch", &self.watch)
            .field("poll", &self.poll)
            .field("delete_output_path", &self.delete_output_path)
            .field("write_to_file_system", &self.write_to_file_system)
            .field("write_filter", &self.write_filter.is_some())
            .field("watch_policy", &self.watch_policy)
            .field("verbose", &self.verbose)
            .field("ignored_paths", &self.ignored_paths)
            .finish_non_exhaustive()
    }
}

impl RunnerConfig {
    /// Single-shot build of `project_root` into `output_path`.
    pub fn new(output_path: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            output_path: output_path.into(),
            workspace_root: project_root.clone(),
            project_root,
            watch: false,
            poll: None,
            delete_output_path: false,
            write_to_file_system: true,
            write_filter: None,
            cancellation: CancellationToken::new(),
            watch_policy: WatchPolicy::default(),
            verbose: false,
            ignored_paths: Vec::new(),
        }
    }

    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Use a polling watcher with the given interval.
    pub fn poll(mut self, interval: Option<Duration>) -> Self {
        self.poll = interval;
        self
    }

    pub fn delete_output_path(mut self, enabled: bool) -> Self {
        self.delete_output_path = enabled;
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn write_to_file_system(mut self, enabled: bool) -> Self {
        self.write_to_file_system = enabled;
        self
    }

    pub fn write_filter(mut self, filter: Option<WriteFilter>) -> Self {
        self.write_filter = filter;
        self
    }

    /// Token that ends the session when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn watch_policy(mut self, policy: WatchPolicy) -> Self {
        self.watch_policy = policy;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn ignored_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.ignored_paths = paths;
        self
    }
}

/// Where the runner is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    /// Nothing has run yet.
    Idle,
    /// A bundler invocation is in flight.
    Invoking,
    /// Outputs of a successful invocation are being persisted.
    WritingBack,
    /// Watch mode: waiting for the next batch of relevant changes.
    AwaitingChange,
    /// The cancellation token fired. Terminal.
    Cancelled,
    /// Single-shot build done, fatal error, closed, or change source ended.
    /// Terminal.
    Terminated,
}

impl RunnerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerPhase::Cancelled | RunnerPhase::Terminated)
    }
}

/// Result of one build cycle, as yielded to the caller.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub success: bool,
    /// Everything the bundler produced, including files filtered out of the
    /// write-back. `None` for failed builds.
    pub output_files: Option<Vec<OutputFile>>,
    pub asset_files: Option<Vec<AssetCopyEntry>>,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
    /// 1 for the initial build, incremented on every rebuild.
    pub iteration: usize,
}

impl BuildOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

enum Wake {
    Changes(ChangeBatch),
    SourceClosed,
    Cancelled,
}

/// A single-shot or watch-mode build session.
///
/// Pull outcomes with [`next`](Self::next) or convert the session into a
/// [`Stream`] with [`into_stream`](Self::into_stream). Dropping the session
/// releases its file watcher.
pub struct BuildActionRunner<B: Bundler> {
    bundler: B,
    config: RunnerConfig,
    phase: RunnerPhase,
    slot: RebuildSlot<B::State>,
    tracker: OutputTracker,
    change_source: Option<Box<dyn ChangeSource>>,
    watch_inputs: Vec<PathBuf>,
    watching: bool,
    iteration: usize,
}

impl<B: Bundler> BuildActionRunner<B> {
    pub fn new(bundler: B, mut config: RunnerConfig) -> Self {
        config.output_path = absolutize(&config.output_path);
        config.project_root = absolutize(&config.project_root);
        config.workspace_root = absolutize(&config.workspace_root);
        config.ignored_paths = config.ignored_paths.iter().map(|p| absolutize(p)).collect();

        Self {
            bundler,
            config,
            phase: RunnerPhase::Idle,
            slot: RebuildSlot::new(),
            tracker: OutputTracker::new(),
            change_source: None,
            watch_inputs: Vec::new(),
            watching: false,
            iteration: 0,
        }
    }

    /// Use `source` instead of a filesystem watcher in watch mode.
    pub fn with_change_source(mut self, source: Box<dyn ChangeSource>) -> Self {
        self.change_source = Some(source);
        self
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the next build cycle.
    ///
    /// Returns `None` once the session is over: after the single-shot
    /// build, on cancellation, or when the change source ends. A fatal error
    /// is returned once as `Some(Err(..))`; the session is over afterwards.
    pub async fn next(&mut self) -> Option<Result<BuildOutcome>> {
        match self.step().await {
            Ok(outcome) => outcome.map(Ok),
            Err(e) => {
                tracing::error!("{}", e);
                self.shutdown(RunnerPhase::Terminated);
                Some(Err(e))
            }
        }
    }

    /// End the session and release the change source. Idempotent.
    pub fn close(&mut self) {
        if !self.phase.is_terminal() {
            self.shutdown(RunnerPhase::Terminated);
        }
    }

    /// The session as a [`Stream`] of outcomes.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<BuildOutcome>> + Send
    where
        B: 'static,
    {
        async_stream::stream! {
            while let Some(item) = self.next().await {
                yield item;
            }
        }
    }

    async fn step(&mut self) -> Result<Option<BuildOutcome>> {
        if self.phase.is_terminal() {
            return Ok(None);
        }
        if self.config.cancellation.is_cancelled() {
            self.shutdown(RunnerPhase::Cancelled);
            return Ok(None);
        }

        match self.phase {
            RunnerPhase::Idle => {
                if self.config.delete_output_path {
                    let RunnerConfig {
                        output_path,
                        project_root,
                        workspace_root,
                        ..
                    } = &self.config;
                    clean_output_path(output_path, project_root, workspace_root).await?;
                }
                if self.config.watch {
                    tracing::info!("Watch mode enabled. Watching for file changes...");
                    self.watching = true;
                }
            }
            RunnerPhase::AwaitingChange => match self.await_change().await? {
                Wake::Changes(batch) => {
                    tracing::info!("Changes detected. Rebuilding...");
                    if self.config.verbose {
                        for path in batch.paths() {
                            tracing::info!("  {}", path.display());
                        }
                    }
                }
                Wake::SourceClosed => {
                    tracing::debug!("Change source ended, stopping watch session");
                    self.shutdown(RunnerPhase::Terminated);
                    return Ok(None);
                }
                Wake::Cancelled => {
                    self.shutdown(RunnerPhase::Cancelled);
                    return Ok(None);
                }
            },
            // A previous `next()` future was dropped mid-cycle. Its state
            // and write-back are unknown, so start over from scratch.
            RunnerPhase::Invoking | RunnerPhase::WritingBack => {
                self.slot.discard();
                self.tracker.clear();
            }
            RunnerPhase::Cancelled | RunnerPhase::Terminated => return Ok(None),
        }

        self.run_cycle().await
    }

    /// Invoke the bundler once and persist its result.
    async fn run_cycle(&mut self) -> Result<Option<BuildOutcome>> {
        self.phase = RunnerPhase::Invoking;
        let started = Instant::now();
        let cancel = self.config.cancellation.clone();
        let previous = self.slot.take();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.bundler.invoke(previous, cancel.child_token()) => Some(result),
        };
        let Some(result) = result else {
            tracing::debug!("Invocation aborted by cancellation");
            self.shutdown(RunnerPhase::Cancelled);
            return Ok(None);
        };

        let Invocation {
            success,
            output_files,
            asset_files,
            diagnostics,
            watch_files,
            state,
        } = result?;
        self.slot.replace(state);
        // notify reports absolute paths; relative inputs would never match.
        self.watch_inputs = watch_files
            .iter()
            .map(|path| absolutize(&self.config.project_root.join(path)))
            .collect();
        self.iteration += 1;

        if success && self.config.write_to_file_system {
            self.phase = RunnerPhase::WritingBack;
            self.write_back(&output_files, &asset_files).await?;
        }

        // The write-back ran to completion, but its result is not reported.
        if cancel.is_cancelled() {
            self.shutdown(RunnerPhase::Cancelled);
            return Ok(None);
        }

        let duration = started.elapsed();
        if success {
            tracing::info!(
                iteration = self.iteration,
                "Build completed in {}ms",
                duration.as_millis()
            );
        } else {
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            tracing::warn!(
                iteration = self.iteration,
                "Build failed with {} error(s) in {}ms",
                errors,
                duration.as_millis()
            );
        }

        self.phase = if self.config.watch {
            RunnerPhase::AwaitingChange
        } else {
            RunnerPhase::Terminated
        };

        Ok(Some(BuildOutcome {
            success,
            output_files: success.then_some(output_files),
            asset_files: success.then_some(asset_files),
            diagnostics,
            duration,
            iteration: self.iteration,
        }))
    }

    /// Persist what changed since the last write-back and delete outputs
    /// and assets that are no longer produced.
    async fn write_back(
        &mut self,
        output_files: &[OutputFile],
        asset_files: &[AssetCopyEntry],
    ) -> Result<()> {
        let output_path = &self.config.output_path;
        let plan = self.tracker.plan_with_assets(
            output_files,
            asset_files,
            self.config.write_filter.as_ref(),
        )?;

        let removed = remove_output_files(output_path, &plan.removed).await?;
        let summary = write_output_files(&plan.changed, asset_files, output_path, None).await?;

        tracing::debug!(
            written = summary.files_written,
            unchanged = plan.unchanged,
            removed,
            assets = summary.assets_copied,
            "Write-back to {} complete",
            output_path.display()
        );

        self.tracker.commit(plan);
        Ok(())
    }

    /// Wait for the next relevant change batch, creating the file watcher on
    /// first use.
    async fn await_change(&mut self) -> Result<Wake> {
        if self.change_source.is_none() {
            let watcher = FileWatcher::new(
                &self.config.project_root,
                &self.config.output_path,
                self.config.ignored_paths.clone(),
                &self.config.watch_policy,
                self.config.poll,
            )?;
            self.change_source = Some(Box::new(watcher));
        }
        let Some(source) = self.change_source.as_mut() else {
            return Ok(Wake::SourceClosed);
        };

        source.subscribe(&self.watch_inputs)?;

        let cancel = self.config.cancellation.clone();
        Ok(tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Cancelled,
            batch = source.next_batch() => match batch {
                Some(batch) => Wake::Changes(batch),
                None => Wake::SourceClosed,
            },
        })
    }

    fn shutdown(&mut self, phase: RunnerPhase) {
        if let Some(mut source) = self.change_source.take() {
            source.close();
        }
        self.slot.discard();
        if self.watching && phase == RunnerPhase::Cancelled {
            tracing::debug!("Watch session cancelled");
        }
        self.phase = phase;
    }
}

/// Empty the output directory, keeping the directory itself.
async fn clean_output_path(
    output: &Path,
    project_root: &Path,
    workspace_root: &Path,
) -> Result<()> {
    if project_root.starts_with(output) {
        return Err(Error::InvalidOutputPath(format!(
            "Output path '{}' MUST not be the project root directory or one of its parents",
            output.display()
        )));
    }
    if workspace_root.starts_with(output) {
        return Err(Error::InvalidOutputPath(format!(
            "Output path '{}' MUST not be the workspace root directory or one of its parents",
            output.display()
        )));
    }

    let mut entries = match tokio::fs::read_dir(output).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::write_failure(output, e)),
    };

    let mut removed = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::write_failure(output, e))?
    {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .await
            .map_err(|e| Error::write_failure(&path, e))?
            .is_dir();
        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| Error::write_failure(&path, e))?;
        removed += 1;
    }

    tracing::debug!(removed, "Cleaned output path {}", output.display());
    Ok(())
}

impl<B: Bundler> Drop for BuildActionRunner<B> {
    fn drop(&mut self) {
        if let Some(mut source) = self.change_source.take() {
            source.close();
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .map(|p| p.clean())
        .unwrap_or_else(|_| path.clean())
}
