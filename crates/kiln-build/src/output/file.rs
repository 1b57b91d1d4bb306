//! In-memory build artifacts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Logical role of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFileType {
    /// Served to end users
    Browser,
    /// Only needed for server-side rendering or prerendering
    Server,
    /// Images, fonts and other binary media
    Media,
}

/// One artifact produced by a bundling pass.
///
/// Immutable once created. The contents live in a shared buffer, so cloning
/// an `OutputFile` into a [`BuildOutcome`](crate::BuildOutcome) and handing
/// it to the writer does not copy bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    path: String,
    contents: Arc<[u8]>,
    file_type: OutputFileType,
}

impl OutputFile {
    /// Create an output file at `path`, relative to the output directory.
    pub fn new(
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        file_type: OutputFileType,
    ) -> Self {
        let contents: Vec<u8> = contents.into();
        Self {
            path: path.into(),
            contents: contents.into(),
            file_type,
        }
    }

    /// Relative output path, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Contents as UTF-8, if they are valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    pub fn file_type(&self) -> OutputFileType {
        self.file_type
    }

    pub fn size(&self) -> usize {
        self.contents.len()
    }

    /// BLAKE3 hash of the contents.
    pub fn hash(&self) -> blake3::Hash {
        blake3::hash(&self.contents)
    }
}

/// A file copied verbatim into the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCopyEntry {
    /// Absolute path of the file to copy.
    pub source: PathBuf,
    /// Destination relative to the output directory.
    pub destination: String,
}

impl AssetCopyEntry {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Predicate deciding whether an output file is persisted.
///
/// Returning `false` keeps the file out of the write set; it is still
/// reported to the caller.
pub type WriteFilter = Arc<dyn Fn(&OutputFile) -> bool + Send + Sync>;

/// Filter that drops [`OutputFileType::Server`] files.
///
/// Used when server-side rendering is not configured: server bundles for
/// prerendering are not meant for end users.
pub fn server_output_filter() -> WriteFilter {
    Arc::new(|file: &OutputFile| file.file_type() != OutputFileType::Server)
}

pub(crate) fn is_kept(filter: Option<&WriteFilter>, file: &OutputFile) -> bool {
    filter.is_none_or(|keep| keep(file))
}
