// src/paths.rs

//! Directory layout under the pallet root

use std::path::{Path, PathBuf};

/// Paths derived from the configured root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bucket checkouts: `<root>/buckets/<bucket>/bucket/<name>.json`
    pub fn buckets_dir(&self) -> PathBuf {
        self.root.join("buckets")
    }

    /// Finished and partial downloads
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// The install lock file
    pub fn lock_path(&self) -> PathBuf {
        self.locks_dir().join("pallet.lock")
    }
}
