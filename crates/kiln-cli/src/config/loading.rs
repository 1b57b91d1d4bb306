use crate::cli::BuildArgs;
use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File looked up in the current directory when no --config is given.
pub const CONFIG_FILE_NAME: &str = "kiln.config.json";

/// Environment variables read with the `KILN_` prefix.
const ENV_KEYS: &[&str] = &["project", "configuration", "watch", "poll", "ssr", "cache"];

/// A merged configuration and where it was found.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KilnConfig,
    /// Directory relative paths resolve against.
    pub workspace_root: PathBuf,
    /// Config file that contributed, if any.
    pub config_path: Option<PathBuf>,
}

/// Flags that were actually passed on the command line. Absent fields leave
/// lower-priority sources alone.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    poll: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_output_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssr: Option<bool>,
}

impl CliOverrides {
    fn from_build_args(args: &BuildArgs, cwd: &Path) -> Self {
        Self {
            project: args.project.clone(),
            // --out-dir is relative to where the command runs, not to the
            // config file.
            output_path: args.out_dir.as_ref().map(|dir| cwd.join(dir)),
            watch: args.watch.then_some(true),
            poll: args.poll,
            delete_output_path: args.no_delete_output_path.then_some(false),
            ssr: args.ssr.then_some(true),
        }
    }
}

impl KilnConfig {
    /// Load configuration from multiple sources.
    /// Priority: CLI args > environment variables > config file > defaults
    ///
    /// `cwd` is where `kiln.config.json` is looked up when `args.config` is
    /// not set, and what relative CLI paths resolve against.
    pub fn load(args: &BuildArgs, cwd: &Path) -> Result<LoadedConfig> {
        let config_path = locate_config(args.config.as_deref(), cwd)?;

        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = &config_path {
            figment = figment.merge(Json::file(path));
        }

        // KILN_PROJECT, KILN_WATCH, ...
        figment = figment
            .merge(Env::prefixed("KILN_").only(ENV_KEYS))
            .merge(Serialized::defaults(CliOverrides::from_build_args(args, cwd)));

        let config: KilnConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let workspace_root = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        tracing::debug!(
            config = ?config_path,
            workspace = %workspace_root.display(),
            "Loaded configuration"
        );

        Ok(LoadedConfig {
            config,
            workspace_root,
            config_path,
        })
    }
}

/// Resolve the config file to read. An explicit path must exist; the
/// default file is optional.
fn locate_config(explicit: Option<&Path>, cwd: &Path) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let path = cwd.join(path);
            if !path.is_file() {
                return Err(ConfigError::NotFound(path).into());
            }
            Ok(Some(path))
        }
        None => {
            let path = cwd.join(CONFIG_FILE_NAME);
            Ok(path.is_file().then_some(path))
        }
    }
}
