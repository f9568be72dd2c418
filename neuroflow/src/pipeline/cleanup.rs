//! Removal of intermediates after a scan's mask is published.

use crate::core::StagePaths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Which intermediates to delete after a scan succeeds.
///
/// Failed scans are never cleaned up so their intermediates can be
/// inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Keep everything (default).
    #[default]
    Retain,
    /// Remove the ANTs transforms and inverse-warped image.
    Transforms,
    /// Remove every intermediate of the scan.
    All,
}

impl CleanupPolicy {
    /// Deletes the intermediates this policy selects for `subject_id`.
    ///
    /// Failures are logged and otherwise ignored. Returns the number of
    /// paths removed.
    pub async fn apply(&self, paths: &StagePaths, subject_id: &str) -> usize {
        match self {
            Self::Retain => 0,
            Self::Transforms => {
                let mut removed = 0;
                for file in paths.registration_side_outputs(subject_id) {
                    if remove_path(&file).await {
                        removed += 1;
                    }
                }
                removed
            }
            Self::All => {
                let mut removed = 0;
                for dir in paths.scan_dirs(subject_id) {
                    if remove_path(&dir).await {
                        removed += 1;
                    }
                }
                removed
            }
        }
    }
}

async fn remove_path(path: &Path) -> bool {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Removed intermediate");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove intermediate");
            false
        }
    }
}
