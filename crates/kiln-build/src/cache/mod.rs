//! On-disk cache location and stale cache cleanup.
//!
//! Bundlers keep their persistent caches under `<base_path>/<version>`. A
//! tool upgrade changes the version directory, so caches written by older
//! versions are never read again. [`purge_stale_build_cache`] deletes them
//! before a build starts.

use std::path::{Path, PathBuf};

use futures::future::try_join_all;

use crate::{Error, Result};

/// Default cache directory, relative to the workspace root.
pub const DEFAULT_CACHE_DIR: &str = ".kiln/cache";

/// Where the persistent build cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Directory holding one subdirectory per tool version.
    pub base_path: PathBuf,
    /// Cache directory of the running version.
    pub path: PathBuf,
}

impl CacheOptions {
    pub fn new(base_path: impl Into<PathBuf>, version: &str) -> Self {
        let base_path = base_path.into();
        Self {
            enabled: true,
            path: base_path.join(version),
            base_path,
        }
    }

    /// Default cache location for a workspace, versioned by this crate.
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self::new(
            workspace_root.join(DEFAULT_CACHE_DIR),
            env!("CARGO_PKG_VERSION"),
        )
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Remove cache directories left behind by other versions.
///
/// Every directory directly under `base_path` except `path` is deleted.
/// Plain files are left alone. Nothing happens when caching is disabled or
/// the base path does not exist. Returns the number of directories removed.
pub async fn purge_stale_build_cache(cache: &CacheOptions) -> Result<usize> {
    if !cache.enabled {
        return Ok(0);
    }

    let mut entries = match tokio::fs::read_dir(&cache.base_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut stale = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path != cache.path && entry.file_type().await?.is_dir() {
            stale.push(path);
        }
    }

    try_join_all(stale.iter().map(|path| async move {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::write_failure(path, e)),
        }
    }))
    .await?;

    if !stale.is_empty() {
        tracing::debug!(
            removed = stale.len(),
            "Purged stale build cache in {}",
            cache.base_path.display()
        );
    }
    Ok(stale.len())
}
