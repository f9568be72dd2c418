//! Test assertions for stage outputs and run reports.

use std::path::Path;

use crate::core::{StageName, StageOutput, StageStatus};
use crate::pipeline::{RunReport, ScanStatus};

/// Asserts that the output indicates success.
pub fn assert_output_succeeded(output: &StageOutput) {
    assert!(
        output.is_success(),
        "Expected success, got status: {:?} ({:?})",
        output.status,
        output.message()
    );
}

/// Asserts that the output indicates failure.
pub fn assert_output_failed(output: &StageOutput) {
    assert!(
        output.is_failure(),
        "Expected failure, got status: {:?}",
        output.status
    );
}

/// Asserts that the output has the expected status.
pub fn assert_output_status(output: &StageOutput, expected: StageStatus) {
    assert_eq!(
        output.status, expected,
        "Expected status {:?}, got {:?}",
        expected, output.status
    );
}

/// Asserts the final status of one subject in a run report.
pub fn assert_scan_status(report: &RunReport, subject_id: &str, expected: ScanStatus) {
    let scan = report
        .scan(subject_id)
        .unwrap_or_else(|| panic!("No scan '{subject_id}' in report"));
    assert_eq!(
        scan.status, expected,
        "Expected {subject_id} to be {expected:?}, got {:?} (failed stage: {:?})",
        scan.status, scan.failed_stage
    );
}

/// Asserts which stage a subject failed at.
pub fn assert_failed_at(report: &RunReport, subject_id: &str, stage: StageName) {
    assert_scan_status(report, subject_id, ScanStatus::Failed);
    let scan = report.scan(subject_id).map(|s| s.failed_stage);
    assert_eq!(scan, Some(Some(stage)), "Wrong failed stage for {subject_id}");
}

/// Asserts that a file exists and is non-empty.
pub fn assert_volume_exists(path: &Path) {
    let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    assert!(len > 0, "Expected non-empty volume at {}", path.display());
}
