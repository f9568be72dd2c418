//! Lifecycle events emitted while a run progresses.
//!
//! Every event carries a JSON payload with at least `pipeline_run_id`;
//! scan and stage events add `subject_id` and `stage`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run began; payload includes the scan count.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A run finished; payload includes the per-status counts.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A scan entered the pipeline.
pub const SCAN_STARTED: &str = "scan.started";
/// A scan's mask was published.
pub const SCAN_COMPLETED: &str = "scan.completed";
/// A scan stopped at a failed stage.
pub const SCAN_FAILED: &str = "scan.failed";
/// A scan was stopped by cancellation after it started.
pub const SCAN_CANCELLED: &str = "scan.cancelled";
/// A scan was never started because the run was cancelled.
pub const SCAN_SKIPPED: &str = "scan.skipped";
/// A stage began for one scan.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage produced its declared output.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed for one scan.
pub const STAGE_FAILED: &str = "stage.failed";
