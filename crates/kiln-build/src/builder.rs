//! Builder entry points.
//!
//! [`build_application`] prepares a build the way a workspace tool expects:
//! check the framework version, purge stale caches, resolve the target
//! project, normalize options, and hand everything to a
//! [`BuildActionRunner`]. Configuration problems are logged and produce a
//! session that yields nothing; they never surface as a panic or a failed
//! outcome.
//!
//! [`build_legacy_browser`] accepts the legacy browser option shape, runs
//! the application builder without writing, and writes results itself into
//! a flat output directory.

use std::path::PathBuf;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheOptions, purge_stale_build_cache};
use crate::options::{ApplicationOptions, LegacyBrowserOptions, NormalizedOptions, normalize_options};
use crate::output::{WriteFilter, server_output_filter, write_output_files};
use crate::rebuild::Bundler;
use crate::runner::{BuildActionRunner, BuildOutcome, RunnerConfig, RunnerPhase};
use crate::version::{SUPPORTED_FRAMEWORK_VERSIONS, assert_compatible_version};
use crate::watch::WatchPolicy;
use crate::{Error, Result};

/// The project (and optional configuration) a build runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub project: String,
    pub configuration: Option<String>,
    /// Project root relative to the workspace root. Empty for single-project
    /// workspaces.
    pub root: PathBuf,
}

impl BuildTarget {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            configuration: None,
            root: PathBuf::new(),
        }
    }

    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

/// What the surrounding tool knows about the build request.
#[derive(Debug, Clone)]
pub struct BuilderContext {
    pub workspace_root: PathBuf,
    pub target: Option<BuildTarget>,
    /// Installed framework version, if one was found.
    pub framework_version: Option<String>,
    /// Semver requirement `framework_version` must satisfy.
    pub supported_versions: String,
    /// Cancelling this token ends the session.
    pub cancellation: CancellationToken,
    pub cache: CacheOptions,
    pub watch_policy: WatchPolicy,
}

impl BuilderContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            cache: CacheOptions::for_workspace(&workspace_root),
            workspace_root,
            target: None,
            framework_version: None,
            supported_versions: SUPPORTED_FRAMEWORK_VERSIONS.to_string(),
            cancellation: CancellationToken::new(),
            watch_policy: WatchPolicy::default(),
        }
    }

    pub fn target(mut self, target: BuildTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn framework_version(mut self, version: impl Into<String>) -> Self {
        self.framework_version = Some(version.into());
        self
    }

    pub fn supported_versions(mut self, requirement: impl Into<String>) -> Self {
        self.supported_versions = requirement.into();
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }

    pub fn watch_policy(mut self, policy: WatchPolicy) -> Self {
        self.watch_policy = policy;
        self
    }
}

/// Settings of the tool hosting the builder, as opposed to user options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfrastructureSettings {
    /// Persist outputs. `false` leaves all writing to the caller.
    pub write: bool,
}

impl Default for InfrastructureSettings {
    fn default() -> Self {
        Self { write: true }
    }
}

/// Destination for builders that write outputs themselves.
#[derive(Clone)]
struct FlatOutput {
    path: PathBuf,
    filter: Option<WriteFilter>,
}

/// Outcomes of a build started through a builder entry point.
///
/// A session whose setup failed yields nothing; the reason is available
/// from [`setup_error`](Self::setup_error).
pub struct BuildSession<B: Bundler> {
    runner: Option<BuildActionRunner<B>>,
    flat_output: Option<FlatOutput>,
    setup_error: Option<Error>,
}

impl<B: Bundler> BuildSession<B> {
    fn running(runner: BuildActionRunner<B>) -> Self {
        Self {
            runner: Some(runner),
            flat_output: None,
            setup_error: None,
        }
    }

    fn failed(error: Error) -> Self {
        tracing::error!("{}", error);
        Self {
            runner: None,
            flat_output: None,
            setup_error: Some(error),
        }
    }

    /// The configuration error that prevented the build from starting.
    pub fn setup_error(&self) -> Option<&Error> {
        self.setup_error.as_ref()
    }

    pub fn take_setup_error(&mut self) -> Option<Error> {
        self.setup_error.take()
    }

    /// Phase of the underlying runner, `None` if the build never started.
    pub fn phase(&self) -> Option<RunnerPhase> {
        self.runner.as_ref().map(BuildActionRunner::phase)
    }

    /// Resolved runner configuration, `None` if the build never started.
    pub fn config(&self) -> Option<&RunnerConfig> {
        self.runner.as_ref().map(BuildActionRunner::config)
    }

    pub async fn next(&mut self) -> Option<Result<BuildOutcome>> {
        let runner = self.runner.as_mut()?;
        let item = runner.next().await?;

        if let (Ok(outcome), Some(flat)) = (&item, &self.flat_output) {
            if let Some(files) = &outcome.output_files {
                let assets = outcome.asset_files.as_deref().unwrap_or_default();
                let written =
                    write_output_files(files, assets, &flat.path, flat.filter.as_ref()).await;
                if let Err(e) = written {
                    tracing::error!("{}", e);
                    runner.close();
                    return Some(Err(e));
                }
            }
        }

        Some(item)
    }

    /// End the session and release its file watcher.
    pub fn close(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.close();
        }
    }

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
}

/// Start an application build.
///
/// `make_bundler` receives the normalized options and returns the bundler
/// the session drives.
pub async fn build_application<B, F>(
    options: ApplicationOptions,
    context: &BuilderContext,
    settings: InfrastructureSettings,
    make_bundler: F,
) -> BuildSession<B>
where
    B: Bundler,
    F: FnOnce(&NormalizedOptions) -> Result<B>,
{
    match prepare(options, context, settings, make_bundler).await {
        Ok(runner) => BuildSession::running(runner),
        Err(e) => BuildSession::failed(e),
    }
}

async fn prepare<B, F>(
    options: ApplicationOptions,
    context: &BuilderContext,
    settings: InfrastructureSettings,
    make_bundler: F,
) -> Result<BuildActionRunner<B>>
where
    B: Bundler,
    F: FnOnce(&NormalizedOptions) -> Result<B>,
{
    assert_compatible_version(
        context.framework_version.as_deref(),
        &context.supported_versions,
    )?;

    // A cache that cannot be cleaned is not a reason to fail the build.
    if let Err(e) = purge_stale_build_cache(&context.cache).await {
        tracing::warn!("Failed to purge stale build cache: {}", e);
    }

    let Some(target) = context.target.as_ref() else {
        return Err(Error::MissingTarget("application".to_string()));
    };

    let normalized = normalize_options(&context.workspace_root, target, options)?;
    tracing::debug!(
        project = %normalized.project_name,
        configuration = ?target.configuration,
        "Building {}",
        normalized.browser.display()
    );

    let bundler = make_bundler(&normalized)?;
    let config = runner_config(&normalized, context, settings);
    Ok(BuildActionRunner::new(bundler, config))
}

fn runner_config(
    normalized: &NormalizedOptions,
    context: &BuilderContext,
    settings: InfrastructureSettings,
) -> RunnerConfig {
    // Prerendering bundles are of no use to end users without SSR.
    let write_filter = (!normalized.writes_server_files()).then(server_output_filter);

    let mut ignored_paths = Vec::new();
    if context.cache.enabled {
        ignored_paths.push(context.cache.base_path.clone());
    }

    RunnerConfig::new(&normalized.output_path, &normalized.project_root)
        .workspace_root(&normalized.workspace_root)
        .watch(normalized.watch)
        .poll(normalized.poll)
        .delete_output_path(normalized.delete_output_path)
        .verbose(normalized.verbose)
        .write_to_file_system(settings.write)
        .write_filter(write_filter)
        .cancellation(context.cancellation.clone())
        .watch_policy(context.watch_policy.clone())
        .ignored_paths(ignored_paths)
}

/// Start a build from legacy browser options.
///
/// Results are written directly into the output path, without the layout
/// the application builder's bundler may impose, unless `settings.write`
/// is `false`.
pub async fn build_legacy_browser<B, F>(
    options: LegacyBrowserOptions,
    context: &BuilderContext,
    settings: InfrastructureSettings,
    make_bundler: F,
) -> BuildSession<B>
where
    B: Bundler,
    F: FnOnce(&NormalizedOptions) -> Result<B>,
{
    let mut session = build_application(
        options.into(),
        context,
        InfrastructureSettings { write: false },
        make_bundler,
    )
    .await;

    if settings.write {
        session.flat_output = session.config().map(|config| FlatOutput {
            path: config.output_path.clone(),
            filter: config.write_filter.clone(),
        });
    }
    session
}
