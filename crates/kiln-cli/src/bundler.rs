//! A bundler that copies the source tree to the output unchanged.
//!
//! It does no transformation. It exists so `kiln build` can exercise the
//! whole orchestration loop on a real project: every file under the source
//! root becomes an output, `assets` entries become copies, and the rebuild
//! state is a content cache so a rebuild rereads only files whose
//! modification time changed.
//!
//! A source file containing [`ERROR_MARKER`] fails the build with a
//! diagnostic pointing at the marker.

use async_trait::async_trait;
use kiln_build::{
    AssetCopyEntry, Bundler, Diagnostic, Error, Invocation, NormalizedOptions, OutputFile,
    OutputFileType, Result,
};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Marker that makes a source file fail the build.
pub const ERROR_MARKER: &str = "@kiln-error";

const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf", "mp4",
    "webm", "mp3", "wav",
];

/// Sources read by the previous pass.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: FxHashMap<PathBuf, CachedSource>,
}

#[derive(Debug)]
struct CachedSource {
    modified: SystemTime,
    contents: Arc<[u8]>,
}

impl SourceCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }
}

/// Copies `source_root` into the output.
#[derive(Debug, Clone)]
pub struct PassthroughBundler {
    source_root: PathBuf,
    browser: PathBuf,
    /// Skipped during the source walk so a nested output or asset
    /// directory is not emitted twice.
    excluded: Vec<PathBuf>,
    assets: Vec<PathBuf>,
}

impl PassthroughBundler {
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when the source root is not a directory.
    pub fn new(options: &NormalizedOptions) -> Result<Self> {
        if !options.source_root.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "source root '{}' is not a directory",
                options.source_root.display()
            )));
        }

        let mut excluded = vec![options.output_path.clone()];
        excluded.extend(options.assets.iter().cloned());

        Ok(Self {
            source_root: options.source_root.clone(),
            browser: options.browser.clone(),
            excluded,
            assets: options.assets.clone(),
        })
    }
}

#[async_trait]
impl Bundler for PassthroughBundler {
    type State = SourceCache;

    async fn invoke(
        &mut self,
        previous: Option<SourceCache>,
        cancel: CancellationToken,
    ) -> Result<Invocation<SourceCache>> {
        let bundler = self.clone();
        tokio::task::spawn_blocking(move || bundler.scan(previous.unwrap_or_default(), &cancel))
            .await
            .map_err(|e| Error::Bundler(format!("source scan panicked: {}", e)))?
    }
}

impl PassthroughBundler {
    fn scan(
        &self,
        mut previous: SourceCache,
        cancel: &CancellationToken,
    ) -> Result<Invocation<SourceCache>> {
        let mut cache = SourceCache::default();
        let mut output_files = Vec::new();
        let mut diagnostics = Vec::new();
        let mut watch_files = Vec::new();
        let mut reread = 0usize;

        if !self.browser.is_file() {
            diagnostics.push(Diagnostic::error(format!(
                "Cannot find browser entry point '{}'",
                self.browser.display()
            )));
        }

        let walker = WalkDir::new(&self.source_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.excluded.iter().any(|p| entry.path().starts_with(p)));

        for entry in walker {
            if cancel.is_cancelled() {
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                // Files can disappear between listing and reading in watch mode.
                Err(e) => {
                    tracing::debug!("Skipping unreadable source entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.source_root) else {
                continue;
            };
            let relative = to_output_path(relative);
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let contents = match previous.entries.remove(path) {
                Some(cached) if cached.modified == modified => cached.contents,
                _ => {
                    reread += 1;
                    match std::fs::read(path) {
                        Ok(bytes) => Arc::from(bytes),
                        Err(e) => {
                            tracing::debug!("Skipping {}: {}", path.display(), e);
                            continue;
                        }
                    }
                }
            };

            if let Some(diagnostic) = find_error_marker(&relative, &contents) {
                diagnostics.push(diagnostic);
            }

            output_files.push(OutputFile::new(
                relative.clone(),
                contents.to_vec(),
                classify(&relative),
            ));
            watch_files.push(path.to_path_buf());
            cache
                .entries
                .insert(path.to_path_buf(), CachedSource { modified, contents });
        }

        let asset_files = self.collect_assets(&mut diagnostics, &mut watch_files);

        tracing::debug!(
            files = output_files.len(),
            reread,
            assets = asset_files.len(),
            "Scanned {}",
            self.source_root.display()
        );

        let invocation = if diagnostics.iter().any(Diagnostic::is_error) {
            Invocation::failed(diagnostics, cache)
        } else {
            Invocation::succeeded(output_files, cache)
                .with_assets(asset_files)
                .with_diagnostics(diagnostics)
        };
        Ok(invocation.with_watch_files(watch_files))
    }

    /// Files are copied under their own name, directories keep their name
    /// as a prefix.
    fn collect_assets(
        &self,
        diagnostics: &mut Vec<Diagnostic>,
        watch_files: &mut Vec<PathBuf>,
    ) -> Vec<AssetCopyEntry> {
        let mut entries = Vec::new();

        for asset in &self.assets {
            let Some(name) = asset.file_name() else {
                continue;
            };

            if asset.is_file() {
                entries.push(AssetCopyEntry::new(asset, to_output_path(Path::new(name))));
                watch_files.push(asset.clone());
                continue;
            }
            if !asset.is_dir() {
                diagnostics.push(Diagnostic::warning(format!(
                    "Asset '{}' does not exist",
                    asset.display()
                )));
                continue;
            }

            let base = asset.parent().unwrap_or(asset);
            for entry in WalkDir::new(asset).sort_by_file_name().into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(relative) = entry.path().strip_prefix(base) {
                    entries.push(AssetCopyEntry::new(entry.path(), to_output_path(relative)));
                    watch_files.push(entry.path().to_path_buf());
                }
            }
        }

        entries
    }
}

/// Forward-slash form of a relative path.
fn to_output_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn classify(relative: &str) -> OutputFileType {
    if relative.starts_with("server/") {
        return OutputFileType::Server;
    }
    let extension = relative
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if MEDIA_EXTENSIONS.contains(&ext.as_str()) => OutputFileType::Media,
        _ => OutputFileType::Browser,
    }
}

fn find_error_marker(relative: &str, contents: &[u8]) -> Option<Diagnostic> {
    let marker = ERROR_MARKER.as_bytes();
    let offset = contents
        .windows(marker.len())
        .position(|window| window == marker)?;

    let before = &contents[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let column = offset - line_start + 1;

    Some(
        Diagnostic::error(format!("Build error marker '{}' found", ERROR_MARKER)).at(
            relative,
            line as u32,
            column as u32,
        ),
    )
}
