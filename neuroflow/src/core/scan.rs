//! Input scans and input directory verification.

use crate::errors::NeuroflowError;
use crate::utils::is_readable_volume;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The only accepted scan extension.
pub const SCAN_EXTENSION: &str = "nii.gz";

/// One subject's T1-weighted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    subject_id: String,
    path: PathBuf,
}

impl Scan {
    /// Creates a scan from a subject id and the volume path.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            subject_id: subject_id.into(),
            path: path.into(),
        }
    }

    /// Builds a scan from a file path, deriving the subject id from the
    /// file name.
    ///
    /// # Errors
    ///
    /// Returns an input error if the file does not carry the `.nii.gz`
    /// extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, NeuroflowError> {
        let path = path.into();
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            NeuroflowError::input(format!("unreadable file name: {}", path.display()))
        })?;

        let subject_id = subject_id_from_file_name(name)
            .ok_or_else(|| {
                NeuroflowError::input(format!(
                    "The file '{name}' is not valid: must have the extension .{SCAN_EXTENSION}"
                ))
            })?
            .to_owned();

        Ok(Self::new(subject_id, path))
    }

    /// The subject identifier.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// The raw volume.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns the subject id for a scan file name.
///
/// Everything after the first dot is the extension and must be exactly
/// `nii.gz`, so `sub-01.nii.gz` yields `sub-01` while `sub.01.nii.gz` and
/// `sub-01.nii` are rejected.
#[must_use]
pub fn subject_id_from_file_name(name: &str) -> Option<&str> {
    let (stem, extension) = name.split_once('.')?;
    (!stem.is_empty() && extension == SCAN_EXTENSION).then_some(stem)
}

/// Lists the scans in `input_dir`, sorted by file name.
///
/// Hidden files and subdirectories are ignored.
///
/// # Errors
///
/// Fails with [`NeuroflowError::Input`] when the directory is missing or
/// unreadable, holds no files, or holds a file that is not a non-empty,
/// readable `.nii.gz` volume.
pub async fn discover_scans(input_dir: &Path) -> Result<Vec<Scan>, NeuroflowError> {
    info!(input_dir = %input_dir.display(), "Checking input images");

    let mut entries = tokio::fs::read_dir(input_dir).await.map_err(|e| {
        NeuroflowError::input(format!(
            "cannot read input directory {}: {e}",
            input_dir.display()
        ))
    })?;

    let unreadable = |e: std::io::Error| {
        NeuroflowError::input(format!(
            "cannot read input directory {}: {e}",
            input_dir.display()
        ))
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            debug!(file = ?name, "Ignoring hidden file");
            continue;
        }
        if entry.file_type().await.map_err(unreadable)?.is_dir() {
            debug!(dir = ?name, "Ignoring subdirectory");
            continue;
        }
        files.push(entry.path());
    }

    if files.is_empty() {
        return Err(NeuroflowError::input(format!(
            "No files were found in the input directory {}",
            input_dir.display()
        )));
    }

    files.sort();
    let scans = files
        .into_iter()
        .map(Scan::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    for scan in &scans {
        if !is_readable_volume(scan.path()).await {
            return Err(NeuroflowError::input(format!(
                "The file '{}' is empty or cannot be read",
                scan.path().display()
            )));
        }
    }

    info!(count = scans.len(), "Input images verified");
    Ok(scans)
}
