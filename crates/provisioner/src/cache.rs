//! Local archive cache.
//!
//! Presence of the file is the only thing checked: a cached archive is never
//! re-validated or re-downloaded.

use crate::error::Result;
use crate::source::ArtifactSource;
use crate::types::StepOutcome;
use std::path::{Path, PathBuf};

/// On-disk location of downloaded artifacts.
#[derive(Debug, Clone)]
pub struct ArchiveCache {
    root: PathBuf,
}

impl ArchiveCache {
    /// Create a cache rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an artifact named `file_name` is cached at.
    #[must_use]
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Whether a file exists at `path`.
    #[must_use]
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Fetch into `path` unless something is already there.
    pub fn ensure(source: &dyn ArtifactSource, path: &Path) -> Result<StepOutcome> {
        if Self::exists(path) {
            log::debug!("Archive already cached at {}", path.display());
            return Ok(StepOutcome::AlreadySatisfied {
                detail: format!("cached at {}", path.display()),
            });
        }

        source.fetch(path)?;
        Ok(StepOutcome::Applied {
            detail: format!(
                "downloaded {} ({})",
                source.descriptor().local_file_name,
                source.kind()
            ),
        })
    }
}
