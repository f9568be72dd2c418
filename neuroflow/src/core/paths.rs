//! Path naming for stage outputs.
//!
//! Every file the pipeline writes is derived from `(subject_id, stage)` here.
//! Each subject gets its own directory under every stage directory, so the
//! paths of two scans never overlap:
//!
//! ```text
//! <work>/extraction/<subject>/<subject>.nii.gz
//! <work>/registration/<subject>/<subject>_Warped.nii.gz
//! <work>/normalization/<subject>/<subject>_0000.nii.gz
//! <work>/segmentation/<subject>/<subject>.nii.gz
//! <output>/<subject>_mask.nii.gz
//! ```

use super::StageName;
use std::path::{Path, PathBuf};

/// Suffix antsRegistrationSyN appends to the output prefix for the warped image.
pub const WARPED_SUFFIX: &str = "Warped.nii.gz";

/// Channel suffix nnU-Net expects on its single-modality input files.
pub const NNUNET_CHANNEL_SUFFIX: &str = "_0000.nii.gz";

/// Suffix of the published lesion mask.
pub const MASK_SUFFIX: &str = "_mask.nii.gz";

/// Files besides the warped image that antsRegistrationSyN writes.
const REGISTRATION_SIDE_OUTPUTS: [&str; 4] = [
    "0GenericAffine.mat",
    "1Warp.nii.gz",
    "1InverseWarp.nii.gz",
    "InverseWarped.nii.gz",
];

/// Derives every path of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl StagePaths {
    /// Creates the path layout for a work directory and an output directory.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// The root of all intermediate files.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The directory receiving the lesion masks.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The directory holding one stage's outputs for one subject.
    #[must_use]
    pub fn stage_dir(&self, subject_id: &str, stage: StageName) -> PathBuf {
        self.work_dir.join(stage.as_str()).join(subject_id)
    }

    /// The declared output of `stage` for `subject_id`.
    #[must_use]
    pub fn output(&self, subject_id: &str, stage: StageName) -> PathBuf {
        let file_name = match stage {
            StageName::Extraction | StageName::Segmentation => format!("{subject_id}.nii.gz"),
            StageName::Registration => format!("{subject_id}_{WARPED_SUFFIX}"),
            StageName::Normalization => format!("{subject_id}{NNUNET_CHANNEL_SUFFIX}"),
        };
        self.stage_dir(subject_id, stage).join(file_name)
    }

    /// The published lesion mask for `subject_id`.
    #[must_use]
    pub fn mask(&self, subject_id: &str) -> PathBuf {
        self.output_dir.join(format!("{subject_id}{MASK_SUFFIX}"))
    }

    /// Temporary name the mask is copied to before being renamed into place.
    #[must_use]
    pub fn mask_staging(&self, subject_id: &str) -> PathBuf {
        self.output_dir.join(format!(".{subject_id}{MASK_SUFFIX}.partial"))
    }

    /// The ANTs transforms and inverse images written next to the warped image.
    #[must_use]
    pub fn registration_side_outputs(&self, subject_id: &str) -> Vec<PathBuf> {
        let prefix = self.stage_dir(subject_id, StageName::Registration);
        REGISTRATION_SIDE_OUTPUTS
            .iter()
            .map(|suffix| prefix.join(format!("{subject_id}_{suffix}")))
            .collect()
    }

    /// Every per-subject stage directory, in stage order.
    #[must_use]
    pub fn scan_dirs(&self, subject_id: &str) -> Vec<PathBuf> {
        StageName::ALL
            .iter()
            .map(|stage| self.stage_dir(subject_id, *stage))
            .collect()
    }
}

/// Recovers the `-o` prefix antsRegistrationSyN needs from the declared
/// warped-image path.
#[must_use]
pub fn registration_prefix(warped: &Path) -> Option<PathBuf> {
    let name = warped.file_name()?.to_str()?;
    let stem = name.strip_suffix(WARPED_SUFFIX)?;
    Some(warped.with_file_name(stem))
}

/// Recovers the nnU-Net case identifier from a channel file name.
#[must_use]
pub fn nnunet_case_id(channel_file: &Path) -> Option<&str> {
    channel_file
        .file_name()?
        .to_str()?
        .strip_suffix(NNUNET_CHANNEL_SUFFIX)
        .filter(|id| !id.is_empty())
}
