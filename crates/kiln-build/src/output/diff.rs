//! Change detection between consecutive output sets.
//!
//! In a watch session most rebuilds touch a handful of files. The tracker
//! keeps the BLAKE3 hash of every file it last persisted and plans the next
//! write-back as: files that are new or whose contents changed, plus paths
//! that were written before but are no longer produced (or are now
//! filtered out). Asset destinations are tracked by path only; assets are
//! copied on every write-back.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use rustc_hash::{FxHashMap, FxHashSet};

use super::file::{AssetCopyEntry, OutputFile, WriteFilter, is_kept};
use crate::{Error, Result};

/// Hashes of the outputs persisted by the previous write-back.
#[derive(Debug, Clone, Default)]
pub struct OutputTracker {
    persisted: FxHashMap<String, blake3::Hash>,
    assets: FxHashSet<String>,
}

/// What the next write-back has to do.
#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    /// Files that are new or whose contents changed.
    pub changed: Vec<OutputFile>,
    /// Number of kept files identical to what is already on disk.
    pub unchanged: usize,
    /// Paths persisted previously that this build no longer writes.
    pub removed: Vec<String>,
    hashes: FxHashMap<String, blake3::Hash>,
    assets: FxHashSet<String>,
}

impl WritePlan {
    /// True when nothing needs to be written or removed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl OutputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files recorded as persisted.
    pub fn len(&self) -> usize {
        self.persisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty()
    }

    /// Compare `files` against the last committed write-back.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateOutput`] if two kept files share a path.
    pub fn plan(&self, files: &[OutputFile], filter: Option<&WriteFilter>) -> Result<WritePlan> {
        self.plan_with_assets(files, &[], filter)
    }

    /// [`plan`](Self::plan), also accounting for the assets copied alongside.
    ///
    /// Every kept file counts against the asset destinations, including the
    /// unchanged ones that will not be rewritten. Asset destinations that a
    /// later build drops are reported in `removed` like stale outputs.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateOutput`] if two kept files, or a file and an asset,
    /// share a destination.
    pub fn plan_with_assets(
        &self,
        files: &[OutputFile],
        assets: &[AssetCopyEntry],
        filter: Option<&WriteFilter>,
    ) -> Result<WritePlan> {
        let mut plan = WritePlan::default();
        let mut destinations: FxHashSet<PathBuf> = FxHashSet::default();

        for file in files.iter().filter(|file| is_kept(filter, file)) {
            let hash = file.hash();
            if plan.hashes.insert(file.path().to_string(), hash).is_some()
                || !destinations.insert(destination_key(file.path()))
            {
                return Err(Error::DuplicateOutput(file.path().to_string()));
            }
            if self.persisted.get(file.path()) == Some(&hash) {
                plan.unchanged += 1;
            } else {
                plan.changed.push(file.clone());
            }
        }

        for asset in assets {
            if !destinations.insert(destination_key(&asset.destination)) {
                return Err(Error::DuplicateOutput(asset.destination.clone()));
            }
            plan.assets.insert(asset.destination.clone());
        }

        let mut removed: Vec<String> = self
            .persisted
            .keys()
            .chain(self.assets.iter())
            .filter(|path| !destinations.contains(&destination_key(path)))
            .cloned()
            .collect();
        removed.sort();
        removed.dedup();
        plan.removed = removed;

        Ok(plan)
    }

    /// Record a plan as persisted. Call only after its write-back succeeded.
    pub fn commit(&mut self, plan: WritePlan) {
        self.persisted = plan.hashes;
        self.assets = plan.assets;
    }

    /// Forget everything, so the next plan writes every file.
    pub fn clear(&mut self) {
        self.persisted.clear();
        self.assets.clear();
    }
}

fn destination_key(path: &str) -> PathBuf {
    Path::new(path).clean()
}
