//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications and the order-enforcing builder
//! - The scan orchestrator
//! - Failure and cleanup policies
//! - The run report and `run_pipeline`

mod builder;
mod cleanup;
mod failure_tolerance;
mod orchestrator;
mod report;
mod run;
mod spec;

#[cfg(test)]
mod orchestrator_tests;

pub use builder::{Pipeline, PipelineBuilder};
pub use cleanup::CleanupPolicy;
pub use failure_tolerance::{FailureCollector, FailureMode, FailureRecord};
pub use orchestrator::Orchestrator;
pub use report::{RunReport, RunTotals, ScanReport, ScanStatus, StageRecord, REPORT_FILE_NAME};
pub use run::{preflight, run_pipeline, run_pipeline_with, Preflight, RunOptions};
pub use spec::StageSpec;
