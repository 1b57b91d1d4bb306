#![cfg_attr(docsrs, feature(doc_cfg))]

//! # kiln-build
//!
//! Build orchestration for Kiln: drives bundling passes, threads incremental
//! rebuild state across a watch session, and decides which output artifacts
//! are persisted.
//!
//! The bundler itself is a collaborator behind the [`Bundler`] trait. This
//! crate only sequences its invocations, manages their lifecycle and writes
//! their results.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kiln_build::{
//!     BuildActionRunner, Bundler, Invocation, OutputFile, OutputFileType, RunnerConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Bundler for Hello {
//!     type State = ();
//!
//!     async fn invoke(
//!         &mut self,
//!         _previous: Option<()>,
//!         _cancel: CancellationToken,
//!     ) -> kiln_build::Result<Invocation<()>> {
//!         Ok(Invocation::succeeded(
//!             vec![OutputFile::new("index.html", "<h1>hi</h1>", OutputFileType::Browser)],
//!             (),
//!         ))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> kiln_build::Result<()> {
//! let config = RunnerConfig::new("dist", ".");
//! let mut session = BuildActionRunner::new(Hello, config);
//! while let Some(outcome) = session.next().await {
//!     let outcome = outcome?;
//!     println!("success: {}", outcome.success);
//! }
//! # Ok(()) }
//! ```
//!
//! ### Watch mode
//!
//! Set [`RunnerConfig::watch`] and keep pulling from the session. Trigger the
//! [`CancellationToken`](tokio_util::sync::CancellationToken) handed to the
//! config, or drop the session, to end it and release the file watcher.

pub mod builder;
pub mod cache;
pub mod diagnostics;
pub mod options;
pub mod output;
pub mod rebuild;
pub mod runner;
pub mod version;
pub mod watch;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use builder::{
    BuildSession, BuildTarget, BuilderContext, InfrastructureSettings, build_application,
    build_legacy_browser,
};
pub use cache::{CacheOptions, purge_stale_build_cache};
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use options::{
    ApplicationOptions, LegacyBrowserOptions, NormalizedOptions, Polyfills, ServiceWorkerOption,
    SsrOption, SsrSettings, normalize_options,
};
pub use output::{
    AssetCopyEntry, OutputFile, OutputFileType, OutputTracker, WriteFilter, WritePlan,
    WriteSummary, server_output_filter, write_output_files,
};
pub use rebuild::{Bundler, Invocation, RebuildSlot};
pub use runner::{BuildActionRunner, BuildOutcome, RunnerConfig, RunnerPhase};
pub use version::{SUPPORTED_FRAMEWORK_VERSIONS, assert_compatible_version};
pub use watch::{
    ChangeBatch, ChangeSender, ChangeSource, ChannelChangeSource, FileChange, FileWatcher,
    Relevance, WatchPolicy,
};

use std::path::PathBuf;

/// Error types for kiln-build operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The builder context carries no target project.
    #[error("The '{0}' builder requires a target to be specified.")]
    MissingTarget(String),

    /// The host framework version is absent or outside the supported range.
    #[error("Incompatible framework version: found {found}, requires {required}")]
    IncompatibleVersion { found: String, required: String },

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// Two output entries map to the same destination.
    #[error("Duplicate output path: {0}")]
    DuplicateOutput(String),

    /// File write operation failed.
    #[error("Failed to write '{}': {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File watcher could not be created or subscribed.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Infrastructure failure reported by a bundler (not a compilation error).
    #[error("Bundler failure: {0}")]
    Bundler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for kiln-build operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::MissingTarget(_) => "MISSING_TARGET",
            Error::IncompatibleVersion { .. } => "INCOMPATIBLE_VERSION",
            Error::InvalidOutputPath(_) => "INVALID_OUTPUT_PATH",
            Error::DuplicateOutput(_) => "DUPLICATE_OUTPUT",
            Error::WriteFailure { .. } => "WRITE_FAILURE",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Bundler(_) => "BUNDLER_ERROR",
            Error::Io(_) => "IO_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file for missing or mistyped fields.\nError: {}",
                msg
            ))),
            Error::MissingTarget(_) => Some(Box::new(
                "Pass a project name, e.g. `--project my-app`.",
            )),
            Error::IncompatibleVersion { required, .. } => Some(Box::new(format!(
                "Install a framework version matching '{}'.",
                required
            ))),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it stays within the output directory and is not the project root.",
                path
            ))),
            Error::DuplicateOutput(path) => Some(Box::new(format!(
                "The bundler produced '{}' more than once. Each output path must be unique.",
                path
            ))),
            Error::WriteFailure { .. } => Some(Box::new(
                "Failed to write file. Check disk space and permissions.",
            )),
            Error::Watch(_) => Some(Box::new(
                "Try `--poll <ms>` if native file watching is unavailable on this filesystem.",
            )),
            _ => None,
        }
    }
}
