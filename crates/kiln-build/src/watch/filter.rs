//! Change-relevance filtering.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use rustc_hash::FxHashSet;

use super::{FileChange, Relevance, WatchPolicy};

/// Decides whether a change should trigger a rebuild.
///
/// Always rejected, whatever the [`Relevance`]:
/// - paths inside the output directory (our own writes)
/// - explicitly ignored paths, such as the cache directory
/// - hidden files and directories below the project root
/// - paths matching an ignore pattern
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    project_root: PathBuf,
    output_path: PathBuf,
    ignored_paths: Vec<PathBuf>,
    ignore_patterns: Vec<String>,
    relevance: Relevance,
    inputs: FxHashSet<PathBuf>,
}

impl ChangeFilter {
    pub fn new(
        project_root: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        ignored_paths: Vec<PathBuf>,
        policy: &WatchPolicy,
    ) -> Self {
        Self {
            project_root: project_root.into().clean(),
            output_path: output_path.into().clean(),
            ignored_paths: ignored_paths.into_iter().map(|p| p.clean()).collect(),
            ignore_patterns: policy.ignore.clone(),
            relevance: policy.relevance,
            inputs: FxHashSet::default(),
        }
    }

    /// Replace the declared inputs of the last build.
    ///
    /// Relative inputs are resolved against the project root, matching the
    /// absolute paths file events carry.
    pub fn set_inputs(&mut self, inputs: &[PathBuf]) {
        self.inputs = inputs
            .iter()
            .map(|p| self.project_root.join(p).clean())
            .collect();
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        self.inputs.iter().map(PathBuf::as_path)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn is_relevant(&self, change: &FileChange) -> bool {
        let path = change.path().clean();

        if path.starts_with(&self.output_path)
            || self.ignored_paths.iter().any(|ignored| path.starts_with(ignored))
            || self.matches_ignore_rules(&path)
        {
            return false;
        }

        let in_project = path.starts_with(&self.project_root);
        match self.relevance {
            Relevance::ProjectTree => in_project || self.inputs.contains(&path),
            Relevance::DeclaredInputs if self.inputs.is_empty() => in_project,
            Relevance::DeclaredInputs => {
                self.inputs.contains(&path) || (change.is_structural() && in_project)
            }
        }
    }

    fn matches_ignore_rules(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.project_root) else {
            return false;
        };

        let relative_str = relative.to_string_lossy();
        for pattern in &self.ignore_patterns {
            if let Some(suffix) = pattern.strip_prefix('*') {
                if relative_str.ends_with(suffix) {
                    return true;
                }
            } else if relative
                .components()
                .any(|component| component.as_os_str() == pattern.as_str())
                || relative.starts_with(pattern)
            {
                return true;
            }
        }

        relative.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}
