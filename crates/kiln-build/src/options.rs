//! Builder options and their normalization.
//!
//! Options arrive in several shapes: the application builder's own, and the
//! legacy browser builder's (`main` instead of `browser`, a single polyfill
//! string instead of a list, a service worker flag plus a separate config
//! path). Every shape is converted once, at the builder boundary, into
//! [`NormalizedOptions`]; nothing downstream sees the variants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::builder::BuildTarget;
use crate::{Error, Result};

/// Polyfills given either as one module or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Polyfills {
    Single(String),
    Many(Vec<String>),
}

impl Polyfills {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Polyfills::Single(polyfill) => vec![polyfill],
            Polyfills::Many(polyfills) => polyfills,
        }
    }
}

impl Default for Polyfills {
    fn default() -> Self {
        Polyfills::Many(Vec::new())
    }
}

/// `ssr: true` or `ssr: { "entry": "server.ts" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SsrOption {
    Enabled(bool),
    Config {
        #[serde(default)]
        entry: Option<PathBuf>,
    },
}

/// `serviceWorker: false` or the path of the service worker config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceWorkerOption {
    Enabled(bool),
    Config(PathBuf),
}

/// Options of the application builder, as written by users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationOptions {
    /// Browser entry point, relative to the workspace root.
    pub browser: Option<PathBuf>,
    /// Server entry point used for prerendering and SSR.
    pub server: Option<PathBuf>,
    pub ssr: Option<SsrOption>,
    pub polyfills: Option<Polyfills>,
    pub service_worker: Option<ServiceWorkerOption>,
    /// Defaults to `dist/<project>`.
    pub output_path: Option<PathBuf>,
    /// Defaults to `<project root>/src`.
    pub source_root: Option<PathBuf>,
    pub watch: bool,
    /// Polling interval in milliseconds.
    pub poll: Option<u64>,
    pub delete_output_path: bool,
    pub verbose: bool,
    pub progress: bool,
    /// Files or directories copied verbatim into the output.
    pub assets: Vec<PathBuf>,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            browser: None,
            server: None,
            ssr: None,
            polyfills: None,
            service_worker: None,
            output_path: None,
            source_root: None,
            watch: false,
            poll: None,
            delete_output_path: true,
            verbose: false,
            progress: true,
            assets: Vec::new(),
        }
    }
}

/// Options of the legacy browser builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyBrowserOptions {
    pub main: Option<PathBuf>,
    pub polyfills: Option<Polyfills>,
    pub service_worker: bool,
    pub ngsw_config_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub source_root: Option<PathBuf>,
    pub watch: bool,
    pub poll: Option<u64>,
    pub delete_output_path: bool,
    pub verbose: bool,
    pub progress: bool,
    pub assets: Vec<PathBuf>,
}

impl Default for LegacyBrowserOptions {
    fn default() -> Self {
        Self {
            main: None,
            polyfills: None,
            service_worker: false,
            ngsw_config_path: None,
            output_path: None,
            source_root: None,
            watch: false,
            poll: None,
            delete_output_path: true,
            verbose: false,
            progress: true,
            assets: Vec::new(),
        }
    }
}

impl From<LegacyBrowserOptions> for ApplicationOptions {
    fn from(legacy: LegacyBrowserOptions) -> Self {
        // Without a config path the service worker stays off.
        let service_worker = match (legacy.service_worker, legacy.ngsw_config_path) {
            (true, Some(path)) => ServiceWorkerOption::Config(path),
            _ => ServiceWorkerOption::Enabled(false),
        };

        Self {
            browser: legacy.main,
            server: None,
            ssr: None,
            polyfills: legacy.polyfills.map(|p| Polyfills::Many(p.into_vec())),
            service_worker: Some(service_worker),
            output_path: legacy.output_path,
            source_root: legacy.source_root,
            watch: legacy.watch,
            poll: legacy.poll,
            delete_output_path: legacy.delete_output_path,
            verbose: legacy.verbose,
            progress: legacy.progress,
            assets: legacy.assets,
        }
    }
}

/// Resolved server-side rendering settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrSettings {
    /// Server entry for the SSR runtime, if configured.
    pub entry: Option<PathBuf>,
}

/// Canonical build configuration. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOptions {
    pub project_name: String,
    pub workspace_root: PathBuf,
    pub project_root: PathBuf,
    pub source_root: PathBuf,
    pub output_path: PathBuf,
    pub browser: PathBuf,
    pub server_entry_point: Option<PathBuf>,
    pub ssr: Option<SsrSettings>,
    pub polyfills: Vec<String>,
    pub service_worker: Option<PathBuf>,
    pub watch: bool,
    pub poll: Option<Duration>,
    pub delete_output_path: bool,
    pub verbose: bool,
    pub progress: bool,
    pub assets: Vec<PathBuf>,
}

impl NormalizedOptions {
    /// Server files are persisted only when SSR is on and a server entry
    /// exists; otherwise they are filtered out of the write-back.
    pub fn writes_server_files(&self) -> bool {
        self.ssr.is_some() && self.server_entry_point.is_some()
    }
}

/// Resolve `options` for `target` inside `workspace_root`.
///
/// # Errors
///
/// [`Error::InvalidConfig`] when the browser entry is missing, the poll
/// interval is zero, or the output path is empty.
pub fn normalize_options(
    workspace_root: &Path,
    target: &BuildTarget,
    options: ApplicationOptions,
) -> Result<NormalizedOptions> {
    let workspace_root = workspace_root.clean();
    let project_root = workspace_root.join(&target.root).clean();
    let resolve = |path: &Path| workspace_root.join(path).clean();

    let browser = options.browser.as_deref().map(resolve).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "Project '{}' has no browser entry point ('browser' option)",
            target.project
        ))
    })?;

    let poll = match options.poll {
        Some(0) => {
            return Err(Error::InvalidConfig(
                "'poll' must be greater than 0 milliseconds".to_string(),
            ));
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    let output_path = match options.output_path {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(Error::InvalidConfig("'outputPath' must not be empty".to_string()));
        }
        Some(path) => resolve(&path),
        None => workspace_root.join("dist").join(&target.project),
    };

    let ssr = match options.ssr {
        None | Some(SsrOption::Enabled(false)) => None,
        Some(SsrOption::Enabled(true)) => Some(SsrSettings { entry: None }),
        Some(SsrOption::Config { entry }) => Some(SsrSettings {
            entry: entry.as_deref().map(resolve),
        }),
    };

    let service_worker = match options.service_worker {
        None | Some(ServiceWorkerOption::Enabled(false)) => None,
        Some(ServiceWorkerOption::Enabled(true)) => Some(project_root.join("ngsw-config.json")),
        Some(ServiceWorkerOption::Config(path)) => Some(resolve(&path)),
    };

    let source_root = options
        .source_root
        .as_deref()
        .map(resolve)
        .unwrap_or_else(|| project_root.join("src"));

    Ok(NormalizedOptions {
        project_name: target.project.clone(),
        server_entry_point: options.server.as_deref().map(resolve),
        polyfills: options.polyfills.unwrap_or_default().into_vec(),
        assets: options.assets.iter().map(|p| resolve(p)).collect(),
        browser,
        ssr,
        service_worker,
        source_root,
        output_path,
        poll,
        watch: options.watch,
        delete_output_path: options.delete_output_path,
        verbose: options.verbose,
        progress: options.progress,
        workspace_root,
        project_root,
    })
}
