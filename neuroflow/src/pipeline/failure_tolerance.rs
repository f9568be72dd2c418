//! Failure policy for a run over many scans.
//!
//! Failures are scoped to a scan: a failed stage always stops that scan.
//! The [`FailureMode`] decides whether the remaining scans still run.

use crate::core::StageName;
use crate::utils::iso_timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How to handle a scan failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Abort the run on the first scan failure.
    FailFast,
    /// Record the failure and process the next scan (default).
    #[default]
    ContinueOnFailure,
}

impl FailureMode {
    /// Returns the configuration spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::ContinueOnFailure => "continue_on_failure",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "continue_on_failure" | "continue" => Ok(Self::ContinueOnFailure),
            other => Err(format!(
                "unknown failure mode '{other}' (expected fail_fast or continue_on_failure)"
            )),
        }
    }
}

/// Record of a scan that stopped at a failed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Subject whose scan failed.
    pub subject_id: String,
    /// The stage that failed.
    pub stage: StageName,
    /// Error message.
    pub error: String,
    /// ISO-8601 time of the failure.
    pub timestamp: String,
}

impl FailureRecord {
    /// Creates a new failure record stamped with the current time.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, stage: StageName, error: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            stage,
            error: error.into(),
            timestamp: iso_timestamp(),
        }
    }
}

/// Collects scan failures from concurrent workers.
#[derive(Debug, Default)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Mutex<Vec<FailureRecord>>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Records a scan failure.
    ///
    /// Returns true if this was the first failure and the run must stop.
    pub fn record_failure(&self, record: FailureRecord) -> bool {
        let mut failures = self.failures.lock();
        failures.push(record);
        self.mode == FailureMode::FailFast && failures.len() == 1
    }

    /// Returns the first recorded failure.
    #[must_use]
    pub fn first_failure(&self) -> Option<FailureRecord> {
        self.failures.lock().first().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_continues() {
        assert_eq!(FailureMode::default(), FailureMode::ContinueOnFailure);
    }

    #[test]
    fn test_failure_mode_parse() {
        assert_eq!("fail_fast".parse::<FailureMode>(), Ok(FailureMode::FailFast));
        assert_eq!("Fail-Fast".parse::<FailureMode>(), Ok(FailureMode::FailFast));
        assert_eq!(
            "continue_on_failure".parse::<FailureMode>(),
            Ok(FailureMode::ContinueOnFailure)
        );
        assert!("best_effort".parse::<FailureMode>().is_err());
    }

    #[test]
    fn test_failure_mode_serde() {
        assert_eq!(
            serde_json::to_string(&FailureMode::FailFast).unwrap(),
            "\"fail_fast\""
        );
        let mode: FailureMode = serde_json::from_str("\"continue_on_failure\"").unwrap();
        assert_eq!(mode, FailureMode::ContinueOnFailure);
    }

    #[test]
    fn test_collector_fail_fast() {
        let collector = FailureCollector::new(FailureMode::FailFast);
        assert!(collector.first_failure().is_none());

        assert!(collector.record_failure(FailureRecord::new(
            "subjectB",
            StageName::Extraction,
            "robex exited with status 1"
        )));

        // Only the first failure triggers the stop
        assert!(!collector.record_failure(FailureRecord::new(
            "subjectC",
            StageName::Registration,
            "boom"
        )));
        assert_eq!(collector.first_failure().unwrap().subject_id, "subjectB");
    }

    #[test]
    fn test_collector_continue_on_failure() {
        let collector = FailureCollector::new(FailureMode::ContinueOnFailure);

        assert!(!collector.record_failure(FailureRecord::new(
            "subjectB",
            StageName::Segmentation,
            "no output"
        )));
        assert_eq!(
            collector.first_failure().unwrap().stage,
            StageName::Segmentation
        );
    }
}
