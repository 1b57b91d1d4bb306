//! Output file sets and their persistence.
//!
//! - [`file`]: the in-memory artifacts a bundling pass produces
//! - [`writer`]: filtered, concurrent write-back to the output directory
//! - [`diff`]: hash-based tracking of what was persisted last time

pub mod diff;
pub mod file;
pub mod writer;

pub use diff::{OutputTracker, WritePlan};
pub use file::{AssetCopyEntry, OutputFile, OutputFileType, WriteFilter, server_output_filter};
pub use writer::{
    DirectoryCreator, FsDirectoryCreator, WriteSummary, remove_output_files, write_output_files,
    write_output_files_with,
};
