//! Stage output type with factory methods.

use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The output of a stage execution.
///
/// A successful output names the volume the stage wrote. The orchestrator
/// checks that this is the stage's declared output before handing it to the
/// next stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// The volume written by the stage (for successful executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Cancel reason (for cancelled executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Wall-clock duration, filled in by the orchestrator.
    #[serde(default)]
    pub duration_ms: f64,

    /// Additional metadata (exit code, command line, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StageOutput {
    fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            output: None,
            error: None,
            cancel_reason: None,
            duration_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful output pointing at the written volume.
    #[must_use]
    pub fn ok(output: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::with_status(StageStatus::Ok)
        }
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(StageStatus::Fail)
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Cancel)
        }
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the output indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the written volume, if any.
    #[must_use]
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Returns the failure or cancel message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref().or(self.cancel_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StageOutput::ok("/work/extraction/s1/s1.nii.gz");
        assert_eq!(output.status, StageStatus::Ok);
        assert!(output.is_success());
        assert!(!output.is_failure());
        assert_eq!(
            output.output_path(),
            Some(Path::new("/work/extraction/s1/s1.nii.gz"))
        );
        assert_eq!(output.message(), None);
    }

    #[test]
    fn test_fail_output() {
        let output = StageOutput::fail("robex exited with status 1");
        assert_eq!(output.status, StageStatus::Fail);
        assert!(output.is_failure());
        assert!(output.output_path().is_none());
        assert_eq!(output.message(), Some("robex exited with status 1"));
    }

    #[test]
    fn test_cancel_output() {
        let output = StageOutput::cancel("run aborted");
        assert_eq!(output.status, StageStatus::Cancel);
        assert!(output.is_failure());
        assert_eq!(output.message(), Some("run aborted"));
    }

    #[test]
    fn test_metadata_and_duration() {
        let output = StageOutput::ok("/tmp/x.nii.gz")
            .add_metadata("exit_code", serde_json::json!(0))
            .with_duration_ms(12.5);
        assert_eq!(output.metadata.get("exit_code"), Some(&serde_json::json!(0)));
        assert!((output.duration_ms - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let output = StageOutput::fail("boom");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["error"], "boom");
        assert!(json.get("output").is_none());
        assert!(json.get("metadata").is_none());
    }
}
