//! Per-run summary written as `run_report.json`.

use super::{CleanupPolicy, FailureMode};
use crate::core::{StageName, StageOutput, StageStatus};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the report inside the output directory.
pub const REPORT_FILE_NAME: &str = "run_report.json";

/// Final state of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// All four stages succeeded and the mask was published.
    Succeeded,
    /// A stage failed; no mask was written.
    Failed,
    /// The run was cancelled while this scan was in flight.
    Cancelled,
    /// The run was cancelled before this scan started.
    Skipped,
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Which stage ran.
    pub stage: StageName,
    /// How it ended.
    pub status: StageStatus,
    /// The declared output path.
    pub output: PathBuf,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Failure message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Records how `stage` ended, taking status, duration and message from
    /// its output.
    #[must_use]
    pub fn from_output(stage: StageName, output: PathBuf, result: &StageOutput) -> Self {
        Self {
            stage,
            status: result.status,
            output,
            duration_ms: result.duration_ms,
            error: result.message().map(ToString::to_string),
        }
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Subject identifier.
    pub subject_id: String,
    /// The raw input scan.
    pub input: PathBuf,
    /// Final state.
    pub status: ScanStatus,
    /// Stages that ran, in order.
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    /// The stage that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageName>,
    /// Failure or cancellation message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The published mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<PathBuf>,
    /// Lowercase hex SHA-256 of the mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_sha256: Option<String>,
    /// Total wall-clock time for the scan.
    pub duration_ms: f64,
}

impl ScanReport {
    /// Creates a report for a scan that has not run any stage yet.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, input: impl Into<PathBuf>, status: ScanStatus) -> Self {
        Self {
            subject_id: subject_id.into(),
            input: input.into(),
            status,
            stages: Vec::new(),
            failed_stage: None,
            error: None,
            mask: None,
            mask_sha256: None,
            duration_ms: 0.0,
        }
    }

    /// Returns true if the mask was published.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ScanStatus::Succeeded
    }
}

/// Scan counts by final state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Scans discovered.
    pub scans: usize,
    /// Scans with a published mask.
    pub succeeded: usize,
    /// Scans that failed at a stage.
    pub failed: usize,
    /// Scans stopped mid-way by cancellation.
    pub cancelled: usize,
    /// Scans never started.
    pub skipped: usize,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub pipeline_run_id: Uuid,
    /// ISO-8601 start time.
    pub started_at: String,
    /// ISO-8601 finish time.
    pub finished_at: String,
    /// Failure mode in effect.
    pub failure_mode: FailureMode,
    /// Cleanup policy in effect.
    pub cleanup: CleanupPolicy,
    /// Why the run was cancelled, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// Per-scan outcomes, in input order.
    pub scans: Vec<ScanReport>,
    /// Counts by final state.
    pub totals: RunTotals,
    /// Fraction of scans with a published mask.
    pub success_rate: f64,
    /// Total wall-clock time.
    pub duration_ms: f64,
}

impl RunReport {
    /// Recomputes `totals` and `success_rate` from `scans`.
    #[allow(clippy::cast_precision_loss)]
    pub fn tally(&mut self) {
        let count = |status| self.scans.iter().filter(|s| s.status == status).count();
        self.totals = RunTotals {
            scans: self.scans.len(),
            succeeded: count(ScanStatus::Succeeded),
            failed: count(ScanStatus::Failed),
            cancelled: count(ScanStatus::Cancelled),
            skipped: count(ScanStatus::Skipped),
        };
        self.success_rate = if self.scans.is_empty() {
            0.0
        } else {
            self.totals.succeeded as f64 / self.scans.len() as f64
        };
    }

    /// Returns true if every scan produced a mask.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.scans.is_empty() && self.scans.iter().all(ScanReport::succeeded)
    }

    /// Returns the report for one subject.
    #[must_use]
    pub fn scan(&self, subject_id: &str) -> Option<&ScanReport> {
        self.scans.iter().find(|s| s.subject_id == subject_id)
    }

    /// Returns the failed scans.
    #[must_use]
    pub fn failed_scans(&self) -> Vec<&ScanReport> {
        self.scans
            .iter()
            .filter(|s| s.status == ScanStatus::Failed)
            .collect()
    }

    /// Serializes the report to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the report into `dir` and returns its path.
    ///
    /// The file is written under a temporary name and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(REPORT_FILE_NAME);
        let staging = dir.join(format!(".{REPORT_FILE_NAME}.partial"));
        tokio::fs::write(&staging, self.to_json()?).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(path)
    }
}
