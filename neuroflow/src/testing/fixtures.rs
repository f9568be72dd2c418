//! On-disk fixtures for pipeline tests.

use std::io;
use std::path::{Path, PathBuf};

use crate::core::StagePaths;

/// A scratch layout with `input/`, `output/` and `work/` directories.
///
/// The caller owns the root (typically a temporary directory) and keeps it
/// alive for the duration of the test.
#[derive(Debug, Clone)]
pub struct TestWorkspace {
    root: PathBuf,
}

impl TestWorkspace {
    /// Creates the directory layout under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let ws = Self { root: root.into() };
        std::fs::create_dir_all(ws.input_dir())?;
        std::fs::create_dir_all(ws.output_dir())?;
        std::fs::create_dir_all(ws.work_dir())?;
        Ok(ws)
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the input scans.
    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    /// Directory receiving the masks.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Directory holding intermediates.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Path layout over this workspace.
    #[must_use]
    pub fn paths(&self) -> StagePaths {
        StagePaths::new(self.work_dir(), self.output_dir())
    }

    /// Writes `<subject>.nii.gz` into the input directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_scan(&self, subject_id: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.input_dir().join(format!("{subject_id}.nii.gz"));
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Writes an arbitrary file into the input directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_input_file(&self, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.input_dir().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Lists file names in the output directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn output_files(&self) -> io::Result<Vec<String>> {
        let mut names = std::fs::read_dir(self.output_dir())?
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}
