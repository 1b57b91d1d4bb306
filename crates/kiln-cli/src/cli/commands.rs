use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available Kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the project
    ///
    /// Runs a single build, or keeps rebuilding on file changes with
    /// --watch until interrupted with Ctrl+C.
    Build(BuildArgs),

    /// Validate configuration without building
    ///
    /// Loads kiln.config.json with the same precedence as `kiln build`
    /// and reports the resolved settings.
    Check(CheckArgs),

    /// Create a starter kiln.config.json
    Init(InitArgs),
}

/// Arguments for the build command
#[derive(Args, Debug, Default, Clone)]
pub struct BuildArgs {
    /// Path to the configuration file
    ///
    /// Defaults to kiln.config.json in the current directory. Relative
    /// paths in the file resolve against the directory containing it.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project to build
    #[arg(short, long, value_name = "NAME")]
    pub project: Option<String>,

    /// Output directory
    ///
    /// Overrides `outputPath` from the configuration file.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Rebuild when source files change
    #[arg(short, long)]
    pub watch: bool,

    /// Use a polling watcher with the given interval in milliseconds
    ///
    /// Native file watching does not work on some network and container
    /// filesystems. Implies nothing unless --watch is set.
    #[arg(long, value_name = "MS")]
    pub poll: Option<u64>,

    /// Keep existing files in the output directory
    #[arg(long)]
    pub no_delete_output_path: bool,

    /// Run the build without writing anything to disk
    #[arg(long)]
    pub no_write: bool,

    /// Write server bundles for server-side rendering
    ///
    /// Server files are only written when a `server` entry is configured.
    #[arg(long)]
    pub ssr: bool,
}

/// Arguments for the check command
#[derive(Args, Debug, Default, Clone)]
pub struct CheckArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the JSON schema of kiln.config.json and exit
    #[arg(long)]
    pub schema: bool,
}

/// Arguments for the init command
#[derive(Args, Debug, Default, Clone)]
pub struct InitArgs {
    /// Directory to create the configuration in
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite an existing kiln.config.json
    #[arg(short, long)]
    pub force: bool,
}
