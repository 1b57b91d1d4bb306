//! Write-back of output files to the output directory.
//!
//! One call persists one build's worth of files:
//!
//! 1. Filter the output files and validate every destination path. Paths
//!    must stay inside the output directory after normalization, and no two
//!    entries may share a destination.
//! 2. Create each distinct parent directory exactly once. This pre-pass
//!    finishes before any write starts, so concurrent writes never race on
//!    directory creation.
//! 3. Issue all file writes and asset copies concurrently and await them
//!    jointly. There is no ordering between distinct files.
//!
//! Existing files are overwritten, so writing the same set twice leaves the
//! same directory contents behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use path_clean::PathClean;
use rustc_hash::FxHashSet;

use super::file::{AssetCopyEntry, OutputFile, WriteFilter, is_kept};
use crate::{Error, Result};

/// Counts of what a write-back touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub files_written: usize,
    pub assets_copied: usize,
    pub directories_created: usize,
}

/// Creates output directories.
///
/// [`FsDirectoryCreator`] is the real implementation; the seam exists so
/// directory creation can be observed.
#[async_trait]
pub trait DirectoryCreator: Send + Sync {
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

/// Creates directories with `tokio::fs::create_dir_all`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirectoryCreator;

#[async_trait]
impl DirectoryCreator for FsDirectoryCreator {
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}

/// Write `output_files` (minus those rejected by `filter`) and copy
/// `asset_files` into `destination`.
///
/// # Errors
///
/// - [`Error::InvalidOutputPath`] if a path escapes `destination`
/// - [`Error::DuplicateOutput`] if two entries share a destination
/// - [`Error::WriteFailure`] if creating a directory, writing or copying fails
pub async fn write_output_files(
    output_files: &[OutputFile],
    asset_files: &[AssetCopyEntry],
    destination: &Path,
    filter: Option<&WriteFilter>,
) -> Result<WriteSummary> {
    write_output_files_with(
        &FsDirectoryCreator,
        output_files,
        asset_files,
        destination,
        filter,
    )
    .await
}

/// [`write_output_files`] with a custom [`DirectoryCreator`].
pub async fn write_output_files_with(
    creator: &dyn DirectoryCreator,
    output_files: &[OutputFile],
    asset_files: &[AssetCopyEntry],
    destination: &Path,
    filter: Option<&WriteFilter>,
) -> Result<WriteSummary> {
    let root = normalize_destination(destination)?;

    let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
    let mut writes = Vec::new();
    for file in output_files.iter().filter(|file| is_kept(filter, file)) {
        let target = validate_output_path(&root, file.path())?;
        if !seen.insert(target.clone()) {
            return Err(Error::DuplicateOutput(file.path().to_string()));
        }
        writes.push((target, file));
    }

    let mut copies = Vec::new();
    for asset in asset_files {
        let target = validate_output_path(&root, &asset.destination)?;
        if !seen.insert(target.clone()) {
            return Err(Error::DuplicateOutput(asset.destination.clone()));
        }
        copies.push((target, asset.source.as_path()));
    }

    // Directory pre-pass: each distinct parent is created once.
    let mut directories: Vec<&Path> = seen
        .iter()
        .filter_map(|target| target.parent())
        .collect::<FxHashSet<_>>()
        .into_iter()
        .collect();
    directories.sort();
    for directory in &directories {
        creator
            .create_dir_all(directory)
            .await
            .map_err(|e| Error::write_failure(*directory, e))?;
    }

    try_join_all(writes.iter().map(|(target, file)| async move {
        tokio::fs::write(target, file.contents())
            .await
            .map_err(|e| Error::write_failure(target, e))
    }))
    .await?;

    try_join_all(
        copies
            .iter()
            .map(|(target, source)| copy_asset(source, target)),
    )
    .await?;

    tracing::debug!(
        files = writes.len(),
        assets = copies.len(),
        directories = directories.len(),
        "Wrote output to {}",
        root.display()
    );

    Ok(WriteSummary {
        files_written: writes.len(),
        assets_copied: copies.len(),
        directories_created: directories.len(),
    })
}

/// Delete previously written outputs that a rebuild no longer produces.
///
/// Files that are already gone are ignored. Parent directories are left in
/// place, even when they end up empty. Returns the number of files actually
/// removed.
pub async fn remove_output_files(destination: &Path, paths: &[String]) -> Result<usize> {
    let root = normalize_destination(destination)?;
    let mut removed = 0;
    for path in paths {
        let target = validate_output_path(&root, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::write_failure(target, e)),
        }
    }
    Ok(removed)
}

/// Copy one asset, cloning the file where the filesystem supports
/// copy-on-write and falling back to a byte copy otherwise.
async fn copy_asset(source: &Path, target: &Path) -> Result<()> {
    let (from, to) = (source.to_path_buf(), target.to_path_buf());
    let cloned = tokio::task::spawn_blocking(move || reflink_copy::reflink(&from, &to))
        .await
        .map_err(|e| Error::write_failure(target, std::io::Error::other(e)))?;

    if cloned.is_err() {
        tokio::fs::copy(source, target)
            .await
            .map_err(|e| Error::write_failure(target, e))?;
    }
    Ok(())
}

/// Normalize the destination directory to an absolute, cleaned path.
fn normalize_destination(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }

    let cwd = std::env::current_dir().map_err(|e| {
        Error::InvalidOutputPath(format!("Failed to get current directory: {}", e))
    })?;
    Ok(cwd.join(cleaned).clean())
}

/// Resolve `relative` under `base_dir`, rejecting anything that escapes it.
///
/// Catches `../../etc/passwd`, `dir/../../x` and absolute paths alike:
/// after joining and cleaning, the result must still start with `base_dir`.
pub(crate) fn validate_output_path(base_dir: &Path, relative: &str) -> Result<PathBuf> {
    if relative.contains('\0') {
        return Err(Error::InvalidOutputPath(format!(
            "Path contains null byte: {:?}",
            relative
        )));
    }

    let full_path = base_dir.join(Path::new(relative).clean()).clean();

    if full_path == base_dir || !full_path.starts_with(base_dir) {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            relative,
            base_dir.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}
