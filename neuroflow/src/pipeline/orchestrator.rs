//! Sequential-per-scan stage execution over a set of scans.
//!
//! Each scan runs extraction → registration → normalization → segmentation,
//! feeding every stage the previous stage's declared output. Independent
//! scans run concurrently up to `max_concurrent_scans`.

use super::{
    CleanupPolicy, FailureCollector, FailureMode, FailureRecord, Pipeline, RunReport, RunTotals,
    ScanReport, ScanStatus, StageRecord, StageSpec,
};
use crate::cancellation::CancellationToken;
use crate::context::{RunIdentity, StageContext};
use crate::core::{Scan, StageName, StageOutput, StagePaths, StageStatus};
use crate::errors::ToolError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::utils::{format_timestamp, is_readable_volume, iso_timestamp, sha256_file};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs a [`Pipeline`] over scans, publishing one mask per successful scan.
#[derive(Debug)]
pub struct Orchestrator {
    pipeline: Pipeline,
    paths: StagePaths,
    failure_mode: FailureMode,
    cleanup: CleanupPolicy,
    max_concurrent_scans: usize,
    event_sink: Arc<dyn EventSink>,
    identity: RunIdentity,
    cancellation: Arc<CancellationToken>,
}

impl Orchestrator {
    /// Creates an orchestrator with sequential, continue-on-failure defaults.
    #[must_use]
    pub fn new(pipeline: Pipeline, paths: StagePaths) -> Self {
        Self {
            pipeline,
            paths,
            failure_mode: FailureMode::default(),
            cleanup: CleanupPolicy::default(),
            max_concurrent_scans: 1,
            event_sink: Arc::new(NoOpEventSink),
            identity: RunIdentity::new(),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the cleanup policy.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Sets how many scans may be in flight at once (minimum 1).
    #[must_use]
    pub fn with_max_concurrent_scans(mut self, n: usize) -> Self {
        self.max_concurrent_scans = n.max(1);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// The identity of this run.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// The path layout used for every scan.
    #[must_use]
    pub fn paths(&self) -> &StagePaths {
        &self.paths
    }

    /// Processes every scan and returns the run summary.
    ///
    /// Scan failures never abort this call; they are reported per scan.
    /// Under [`FailureMode::FailFast`] the first failure cancels the run.
    pub async fn run(&self, scans: &[Scan]) -> RunReport {
        let start = Instant::now();
        let collector = FailureCollector::new(self.failure_mode);

        info!(
            run_id = %self.identity.pipeline_run_id,
            scans = scans.len(),
            failure_mode = %self.failure_mode,
            jobs = self.max_concurrent_scans,
            "Starting pipeline"
        );
        self.emit(
            events::PIPELINE_STARTED,
            json!({
                "scans": scans.len(),
                "failure_mode": self.failure_mode,
                "max_concurrent_scans": self.max_concurrent_scans,
                "stages": self.pipeline.stage_names(),
                "host": self.identity.host,
            }),
        )
        .await;

        let reports: Vec<ScanReport> = stream::iter(scans)
            .map(|scan| self.run_scan(scan, &collector))
            .buffered(self.max_concurrent_scans)
            .collect()
            .await;

        let mut report = RunReport {
            pipeline_run_id: self.identity.pipeline_run_id,
            started_at: format_timestamp(&self.identity.started_at),
            finished_at: iso_timestamp(),
            failure_mode: self.failure_mode,
            cleanup: self.cleanup,
            cancel_reason: self.cancellation.reason(),
            scans: reports,
            totals: RunTotals::default(),
            success_rate: 0.0,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        report.tally();

        info!(
            run_id = %self.identity.pipeline_run_id,
            succeeded = report.totals.succeeded,
            failed = report.totals.failed,
            cancelled = report.totals.cancelled,
            skipped = report.totals.skipped,
            "Pipeline finished"
        );
        self.emit(
            events::PIPELINE_COMPLETED,
            json!({
                "totals": report.totals,
                "success_rate": report.success_rate,
                "duration_ms": report.duration_ms,
                "cancel_reason": report.cancel_reason,
                "first_failure": collector.first_failure(),
            }),
        )
        .await;

        report
    }

    async fn run_scan(&self, scan: &Scan, collector: &FailureCollector) -> ScanReport {
        let subject = scan.subject_id();
        let mut report = ScanReport::new(subject, scan.path(), ScanStatus::Skipped);

        if self.cancellation.is_cancelled() {
            report.error = self.cancellation.reason();
            info!(subject, "Skipping scan, run was cancelled");
            self.emit(
                events::SCAN_SKIPPED,
                json!({"subject_id": subject, "reason": report.error}),
            )
            .await;
            return report;
        }

        info!(subject, input = %scan.path().display(), "Processing scan");
        self.emit(
            events::SCAN_STARTED,
            json!({"subject_id": subject, "input": scan.path()}),
        )
        .await;

        let start = Instant::now();
        let mut input = scan.path().to_path_buf();

        // A mask left by an earlier run must not outlive this attempt
        if let Err(e) = self.discard_mask(subject).await {
            let message = format!(
                "Could not remove previous mask {}: {e}",
                self.paths.mask(subject).display()
            );
            return self
                .fail_scan(report, StageName::Extraction, message, start, collector)
                .await;
        }

        for spec in self.pipeline.stages() {
            if self.cancellation.is_cancelled() {
                let reason = self.cancellation.reason().unwrap_or_default();
                let cancelled = StageOutput::cancel(reason);
                report.stages.push(StageRecord::from_output(
                    spec.name,
                    self.paths.output(subject, spec.name),
                    &cancelled,
                ));
                report.status = ScanStatus::Cancelled;
                report.error = cancelled.message().map(ToString::to_string);
                report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                warn!(subject, next_stage = %spec.name, "Scan cancelled");
                self.emit(
                    events::SCAN_CANCELLED,
                    json!({"subject_id": subject, "stage": spec.name, "reason": report.error}),
                )
                .await;
                return report;
            }

            let record = self.run_stage(subject, &input, spec).await;
            let failed = record.status != StageStatus::Ok;
            let output = record.output.clone();
            let error = record.error.clone();
            report.stages.push(record);

            if failed {
                let message = error.unwrap_or_else(|| "stage failed".to_string());
                return self
                    .fail_scan(report, spec.name, message, start, collector)
                    .await;
            }
            input = output;
        }

        // `input` now names the segmentation output
        let mask = self.paths.mask(subject);
        if let Err(e) = self.publish_mask(subject, &input, &mask).await {
            let message = format!("Could not publish mask {}: {e}", mask.display());
            return self
                .fail_scan(report, StageName::Segmentation, message, start, collector)
                .await;
        }

        let digest = match sha256_file(&mask).await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(subject, error = %e, "Could not hash published mask");
                None
            }
        };

        let removed = self.cleanup.apply(&self.paths, subject).await;
        if removed > 0 {
            debug!(subject, removed, "Cleaned up intermediates");
        }

        report.status = ScanStatus::Succeeded;
        report.mask = Some(mask.clone());
        report.mask_sha256 = digest.clone();
        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(subject, mask = %mask.display(), "Mask written");
        self.emit(
            events::SCAN_COMPLETED,
            json!({
                "subject_id": subject,
                "mask": mask,
                "mask_sha256": digest,
                "duration_ms": report.duration_ms,
            }),
        )
        .await;
        report
    }

    async fn run_stage(&self, subject: &str, input: &Path, spec: &StageSpec) -> StageRecord {
        let stage = spec.name;
        let output = self.paths.output(subject, stage);
        let started = Instant::now();

        let result = match self.prepare_stage_dir(subject, stage).await {
            Ok(()) => {
                let ctx = StageContext::new(
                    self.identity.pipeline_run_id,
                    subject,
                    stage,
                    input,
                    &output,
                );
                self.emit(
                    events::STAGE_STARTED,
                    json!({
                        "subject_id": subject,
                        "stage": stage,
                        "input": input,
                        "output": output,
                    }),
                )
                .await;
                let result = spec.runner.execute(&ctx).await;
                verify_output(result, stage, &output).await
            }
            Err(e) => StageOutput::fail(format!(
                "Could not prepare {}: {e}",
                self.paths.stage_dir(subject, stage).display()
            )),
        }
        .with_duration_ms(started.elapsed().as_secs_f64() * 1000.0);
        let duration_ms = result.duration_ms;

        if result.is_success() {
            debug!(subject, %stage, duration_ms, "Stage completed");
            self.emit(
                events::STAGE_COMPLETED,
                json!({
                    "subject_id": subject,
                    "stage": stage,
                    "output": output,
                    "duration_ms": duration_ms,
                }),
            )
            .await;
        } else {
            self.emit(
                events::STAGE_FAILED,
                json!({
                    "subject_id": subject,
                    "stage": stage,
                    "error": result.message(),
                    "metadata": result.metadata,
                }),
            )
            .await;
        }

        StageRecord::from_output(stage, output, &result)
    }

    async fn fail_scan(
        &self,
        mut report: ScanReport,
        stage: StageName,
        message: String,
        start: Instant,
        collector: &FailureCollector,
    ) -> ScanReport {
        let subject = report.subject_id.clone();
        error!(
            subject = %subject,
            %stage,
            error = %message,
            "Scan {} failed at stage {}",
            subject,
            stage
        );

        report.status = ScanStatus::Failed;
        report.failed_stage = Some(stage);
        report.error = Some(message.clone());
        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.emit(
            events::SCAN_FAILED,
            json!({"subject_id": subject, "stage": stage, "error": message}),
        )
        .await;

        if collector.record_failure(FailureRecord::new(&subject, stage, &message)) {
            let reason = format!("scan '{subject}' failed at stage {stage}");
            if self.cancellation.cancel(reason) {
                warn!(subject = %subject, "Fail-fast: cancelling remaining scans");
            }
        }
        report
    }

    /// Recreates the subject's directory for `stage` so no stale output
    /// from an earlier run can be mistaken for this run's.
    async fn prepare_stage_dir(&self, subject: &str, stage: StageName) -> std::io::Result<()> {
        let dir = self.paths.stage_dir(subject, stage);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&dir).await
    }

    /// Removes the subject's published mask, if any.
    async fn discard_mask(&self, subject: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.paths.mask(subject)).await {
            Ok(()) => {
                debug!(subject, "Removed mask from an earlier run");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Copies the segmentation to a staging name, then renames it into place.
    async fn publish_mask(
        &self,
        subject: &str,
        segmentation: &Path,
        mask: &Path,
    ) -> std::io::Result<()> {
        let staging = self.paths.mask_staging(subject);
        tokio::fs::create_dir_all(self.paths.output_dir()).await?;
        if let Err(e) = tokio::fs::copy(segmentation, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&staging, mask).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        Ok(())
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        let mut data = data;
        if let Some(map) = data.as_object_mut() {
            map.insert(
                "pipeline_run_id".to_string(),
                json!(self.identity.pipeline_run_id.to_string()),
            );
        }
        self.event_sink.emit(event_type, Some(data)).await;
    }
}

/// Turns a reported success into a failure unless the declared output
/// exists and is non-empty.
async fn verify_output(result: StageOutput, stage: StageName, declared: &Path) -> StageOutput {
    if !result.is_success() {
        return result;
    }
    if let Some(reported) = result.output_path() {
        if reported != declared {
            return StageOutput::fail(format!(
                "{stage} reported output {} instead of declared {}",
                reported.display(),
                declared.display()
            ))
            .add_metadata("reported_output", json!(reported));
        }
    }
    if !is_readable_volume(declared).await {
        let err = ToolError::missing_output(stage.as_str(), declared);
        return StageOutput::fail(err.to_string())
            .add_metadata("tool_error", serde_json::to_value(&err).unwrap_or_default());
    }
    result
}
