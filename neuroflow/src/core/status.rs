//! Stage names and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Skull stripping (ROBEX).
    Extraction,
    /// Non-linear registration to the atlas (ANTs SyN).
    Registration,
    /// Intensity rescaling (ANTs `ImageMath Normalize`).
    Normalization,
    /// Lesion segmentation (nnU-Net v2).
    Segmentation,
}

impl StageName {
    /// All stages in the fixed execution order.
    pub const ALL: [Self; 4] = [
        Self::Extraction,
        Self::Registration,
        Self::Normalization,
        Self::Segmentation,
    ];

    /// Returns the stage name as used in paths, logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Registration => "registration",
            Self::Normalization => "normalization",
            Self::Segmentation => "segmentation",
        }
    }

    /// Zero-based position in the pipeline.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Extraction => 0,
            Self::Registration => 1,
            Self::Normalization => 2,
            Self::Segmentation => 3,
        }
    }

    /// The stage whose output this stage consumes.
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage failed.
    Fail,
    /// Stage was not started because the run was cancelled.
    Cancel,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(StageName::Extraction.previous(), None);
        assert_eq!(StageName::Segmentation.previous(), Some(StageName::Normalization));

        for (i, stage) in StageName::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn test_stage_name_display() {
        assert_eq!(StageName::Extraction.to_string(), "extraction");
        assert_eq!(StageName::Registration.to_string(), "registration");
        assert_eq!(StageName::Normalization.to_string(), "normalization");
        assert_eq!(StageName::Segmentation.to_string(), "segmentation");
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Ok.to_string(), "ok");
        assert_eq!(StageStatus::Fail.to_string(), "fail");
        assert_eq!(StageStatus::Cancel.to_string(), "cancel");
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Ok.is_success());
        assert!(StageStatus::Fail.is_failure());
        assert!(StageStatus::Cancel.is_failure());
        assert!(!StageStatus::Cancel.is_success());
    }

    #[test]
    fn test_stage_name_serialize() {
        let json = serde_json::to_string(&StageName::Normalization).unwrap();
        assert_eq!(json, r#""normalization""#);

        let deserialized: StageName = serde_json::from_str(r#""segmentation""#).unwrap();
        assert_eq!(deserialized, StageName::Segmentation);
    }
}
