//! Configuration system for Kiln with multi-source loading.
//!
//! Merges settings from CLI args, environment variables, and
//! `kiln.config.json`. Priority: CLI > Environment > File > Defaults

mod defaults;
mod loading;
mod validation;

use kiln_build::{
    ApplicationOptions, BuildTarget, Polyfills, ServiceWorkerOption, SsrOption, WatchPolicy,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::*;
pub use loading::{CONFIG_FILE_NAME, LoadedConfig};

/// Kiln configuration, loaded from `kiln.config.json` and CLI args.
///
/// Relative paths resolve against the directory holding the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KilnConfig {
    /// Name of the project to build
    #[serde(default = "default_project")]
    pub project: String,

    /// Named configuration of the project (e.g. "production")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,

    /// Project root relative to the workspace. Empty for single-project
    /// workspaces.
    #[serde(default, skip_serializing_if = "path_is_empty")]
    pub root: PathBuf,

    /// Browser entry point (e.g. "src/main.ts")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<PathBuf>,

    /// Server entry point used for server-side rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<PathBuf>,

    /// Enable server-side rendering. Server files are written only when a
    /// server entry is configured as well.
    #[serde(default)]
    pub ssr: bool,

    /// Polyfill modules loaded before the application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polyfills: Vec<String>,

    /// Generate a service worker from `ngsw-config.json` in the project root
    #[serde(default)]
    pub service_worker: bool,

    /// Output directory (defaults to `dist/<project>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Source directory (defaults to `<root>/src`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,

    /// Files or directories copied into the output as-is
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<PathBuf>,

    /// Keep rebuilding on file changes
    #[serde(default)]
    pub watch: bool,

    /// Polling interval in milliseconds; native watching when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<u64>,

    /// Empty the output directory before the first build
    #[serde(default = "default_delete_output_path")]
    pub delete_output_path: bool,

    /// Quiet period after the last change before a rebuild starts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Paths that never trigger a rebuild: a bare name matches a directory
    /// anywhere, `*.ext` matches a suffix
    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,

    /// Keep an incremental build cache under `.kiln/cache`
    #[serde(default = "default_cache")]
    pub cache: bool,
}

fn path_is_empty(path: &PathBuf) -> bool {
    path.as_os_str().is_empty()
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            configuration: None,
            root: PathBuf::new(),
            browser: None,
            server: None,
            ssr: false,
            polyfills: Vec::new(),
            service_worker: false,
            output_path: None,
            source_root: None,
            assets: Vec::new(),
            watch: false,
            poll: None,
            delete_output_path: default_delete_output_path(),
            debounce_ms: default_debounce_ms(),
            watch_ignore: default_watch_ignore(),
            cache: default_cache(),
        }
    }
}

impl KilnConfig {
    /// Generate JSON Schema for kiln.config.json.
    pub fn json_schema() -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(schemars::schema_for!(KilnConfig))
    }

    /// Generate example kiln.config.json content.
    pub fn example_config() -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Self {
            browser: Some(PathBuf::from("src/main.ts")),
            server: Some(PathBuf::from("src/main.server.ts")),
            polyfills: vec!["zone.js".to_string()],
            assets: vec![PathBuf::from("public")],
            ..Self::default()
        })
    }

    /// The target project of the build.
    pub fn build_target(&self) -> BuildTarget {
        let target = BuildTarget::new(&self.project).with_root(&self.root);
        match &self.configuration {
            Some(configuration) => target.with_configuration(configuration),
            None => target,
        }
    }

    /// Options handed to the application builder.
    pub fn application_options(&self, verbose: bool) -> ApplicationOptions {
        ApplicationOptions {
            browser: self.browser.clone(),
            server: self.server.clone(),
            ssr: self.ssr.then_some(SsrOption::Enabled(true)),
            polyfills: (!self.polyfills.is_empty())
                .then(|| Polyfills::Many(self.polyfills.clone())),
            service_worker: Some(ServiceWorkerOption::Enabled(self.service_worker)),
            output_path: self.output_path.clone(),
            source_root: self.source_root.clone(),
            watch: self.watch,
            poll: self.poll,
            delete_output_path: self.delete_output_path,
            verbose,
            progress: !verbose,
            assets: self.assets.clone(),
        }
    }

    pub fn watch_policy(&self) -> WatchPolicy {
        WatchPolicy {
            debounce: Duration::from_millis(self.debounce_ms),
            ignore: self.watch_ignore.clone(),
            ..WatchPolicy::default()
        }
    }
}
