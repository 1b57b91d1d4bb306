//! Shared test utilities for kiln-build tests
//!
//! Provides a scripted bundler whose invocations are decided up front and a
//! directory creator that counts calls.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kiln_build::output::DirectoryCreator;
use kiln_build::{
    AssetCopyEntry, Bundler, Diagnostic, Error, Invocation, OutputFile, OutputFileType, Result,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What one invocation of a [`ScriptedBundler`] does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(Vec<OutputFile>),
    /// Success that also copies assets.
    SucceedWithAssets(Vec<OutputFile>, Vec<AssetCopyEntry>),
    Fail(Vec<Diagnostic>),
    /// Infrastructure failure.
    Fatal(String),
    /// Never completes.
    Hang,
}

/// Bundler following a fixed script. The last step repeats once the script
/// runs out. Its state is the number of completed invocations.
pub struct ScriptedBundler {
    script: VecDeque<Step>,
    last: Step,
    calls: Arc<Mutex<Vec<Option<u32>>>>,
    watch_files: Vec<PathBuf>,
}

impl ScriptedBundler {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            last: Step::Succeed(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            watch_files: Vec::new(),
        }
    }

    pub fn with_watch_files(mut self, files: Vec<PathBuf>) -> Self {
        self.watch_files = files;
        self
    }

    /// Previous state seen by each invocation, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<Option<u32>>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Bundler for ScriptedBundler {
    type State = u32;

    async fn invoke(
        &mut self,
        previous: Option<u32>,
        _cancel: CancellationToken,
    ) -> Result<Invocation<u32>> {
        self.calls.lock().push(previous);
        let state = previous.unwrap_or(0) + 1;

        let step = match self.script.pop_front() {
            Some(step) => {
                self.last = step.clone();
                step
            }
            None => self.last.clone(),
        };

        let invocation = match step {
            Step::Succeed(files) => Invocation::succeeded(files, state),
            Step::SucceedWithAssets(files, assets) => {
                Invocation::succeeded(files, state).with_assets(assets)
            }
            Step::Fail(diagnostics) => Invocation::failed(diagnostics, state),
            Step::Fatal(message) => return Err(Error::Bundler(message)),
            Step::Hang => std::future::pending().await,
        };
        Ok(invocation.with_watch_files(self.watch_files.clone()))
    }
}

/// [`DirectoryCreator`] that records every call.
#[derive(Default)]
pub struct CountingCreator {
    calls: AtomicUsize,
    paths: Mutex<Vec<PathBuf>>,
}

impl CountingCreator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }
}

#[async_trait]
impl DirectoryCreator for CountingCreator {
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().push(path.to_path_buf());
        tokio::fs::create_dir_all(path).await
    }
}

pub fn browser(path: &str, contents: &str) -> OutputFile {
    OutputFile::new(path, contents, OutputFileType::Browser)
}

pub fn server(path: &str, contents: &str) -> OutputFile {
    OutputFile::new(path, contents, OutputFileType::Server)
}

/// Short debounce for channel-driven watch tests.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(10);

/// Upper bound for anything a test awaits.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Relative paths of every file below `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else if let Ok(relative) = path.strip_prefix(base) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut files = Vec::new();
    walk(dir, dir, &mut files);
    files.sort();
    files
}
