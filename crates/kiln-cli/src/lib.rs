//! Kiln CLI - incremental builds with watch mode.
//!
//! This crate is the command-line front end of `kiln-build`. It loads
//! `kiln.config.json`, starts a build session through the application
//! builder and reports each outcome.
//!
//! # Architecture
//!
//! - [`cli`] - Argument definitions (clap)
//! - [`config`] - Multi-source configuration loading (figment)
//! - [`commands`] - `build`, `check` and `init`
//! - [`bundler`] - The file-passthrough bundler `kiln build` drives
//! - [`error`] - Error types with actionable hints
//! - [`logger`] - Tracing subscriber setup
//! - [`ui`] - Status messages and build summaries
//!
//! # Example
//!
//! ```rust
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod bundler;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{BuildError, CliError, ConfigError, Result, ResultExt};
