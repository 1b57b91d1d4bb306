//! Command implementations for the Kiln CLI.
//!
//! - [`build`] - Run a build, once or in watch mode
//! - [`check`] - Configuration validation
//! - [`init`] - Starter configuration
//!
//! Each command provides an `execute` function that takes the parsed
//! command arguments and returns a Result.

pub mod build;
pub mod check;
pub mod init;

pub use build::execute as build_execute;
pub use check::execute as check_execute;
pub use init::execute as init_execute;
