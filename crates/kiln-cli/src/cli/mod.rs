//! Command-line interface definition for Kiln.
//!
//! # Command Structure
//!
//! - `kiln build` - Run a build, once or in watch mode
//! - `kiln check` - Validate configuration without building
//! - `kiln init` - Write a starter `kiln.config.json`

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, CheckArgs, Command, InitArgs};

/// Kiln - incremental build orchestration
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Incremental builds with watch mode",
    long_about = "Kiln drives a bundler once or in a watch loop, carries its incremental\n\
                  state across rebuilds and writes only the outputs that changed."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    ///
    /// Useful for CI/CD environments or when piping output to other tools.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
