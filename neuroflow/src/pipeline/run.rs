//! The top-level `run_pipeline` operation.

use super::{FailureMode, Orchestrator, PipelineBuilder, RunReport};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::RunIdentity;
use crate::core::{discover_scans, Scan, StagePaths};
use crate::errors::{NeuroflowError, Result};
use crate::events::{EventSink, LoggingEventSink};
use crate::tools::{ProcessRunner, ToolRunner};
use crate::utils::{absolutize, ensure_executable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators for a run; the defaults spawn real processes.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Executes the tool commands.
    pub runner: Arc<dyn ToolRunner>,
    /// Receives lifecycle events.
    pub event_sink: Arc<dyn EventSink>,
    /// Stops the run between stages when cancelled.
    pub cancellation: Arc<CancellationToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            runner: Arc::new(ProcessRunner::new()),
            event_sink: Arc::new(LoggingEventSink::default()),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }
}

/// A configuration and scan list that passed every pre-flight check.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Configuration with absolute, resolved paths.
    pub config: PipelineConfig,
    /// Absolute input directory.
    pub input_dir: PathBuf,
    /// Absolute output directory.
    pub output_dir: PathBuf,
    /// Scans found in the input directory, sorted by file name.
    pub scans: Vec<Scan>,
}

/// Validates configuration and inputs without running any tool.
///
/// # Errors
///
/// Returns [`NeuroflowError::Config`] for misconfiguration and
/// [`NeuroflowError::Input`] for a missing, empty or invalid input directory.
pub async fn preflight(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<Preflight> {
    let config = config.resolve()?;

    let input_dir = absolutize(input_dir);
    if !input_dir.is_dir() {
        return Err(NeuroflowError::input(format!(
            "Input directory not found: {}",
            input_dir.display()
        )));
    }
    let scans = discover_scans(&input_dir).await?;

    Ok(Preflight {
        config,
        input_dir,
        output_dir: absolutize(output_dir),
        scans,
    })
}

/// Runs every scan in `input_dir` through the four stages with real tools.
///
/// # Errors
///
/// See [`run_pipeline_with`].
pub async fn run_pipeline(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<RunReport> {
    run_pipeline_with(input_dir, output_dir, config, RunOptions::default()).await
}

/// Runs every scan in `input_dir` through the four stages.
///
/// Produces `<subject>_mask.nii.gz` in `output_dir` for each scan whose
/// four stages all succeeded. Scan failures are reported in the returned
/// [`RunReport`] under `continue_on_failure`.
///
/// # Errors
///
/// - [`NeuroflowError::Config`] / [`NeuroflowError::Input`] before any stage runs
/// - [`NeuroflowError::Aborted`] when a scan fails under `fail_fast`
pub async fn run_pipeline_with(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    options: RunOptions,
) -> Result<RunReport> {
    let Preflight {
        config,
        output_dir,
        scans,
        ..
    } = preflight(input_dir, output_dir, config).await?;
    let work_dir = config.work_dir_for(&output_dir);

    for dir in [&output_dir, &work_dir] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            NeuroflowError::config(format!("Cannot create {}: {e}", dir.display()))
        })?;
    }

    ensure_executable(&config.tools.robex).await;

    let pipeline = PipelineBuilder::standard(&config, options.runner)?;
    let orchestrator = Orchestrator::new(pipeline, StagePaths::new(&work_dir, &output_dir))
        .with_failure_mode(config.failure_mode)
        .with_cleanup(config.cleanup)
        .with_max_concurrent_scans(config.max_concurrent_scans)
        .with_event_sink(options.event_sink)
        .with_cancellation(options.cancellation)
        .with_identity(RunIdentity::new());

    let report = orchestrator.run(&scans).await;

    if config.write_report {
        match report.write_json(&output_dir).await {
            Ok(path) => info!(path = %path.display(), "Run report written"),
            Err(e) => warn!(error = %e, "Could not write run report"),
        }
    }

    if config.failure_mode == FailureMode::FailFast {
        let first = report
            .failed_scans()
            .into_iter()
            .find_map(|scan| scan.failed_stage.map(|stage| (scan, stage)));
        if let Some((scan, stage)) = first {
            return Err(NeuroflowError::Aborted {
                subject: scan.subject_id.clone(),
                stage,
                message: scan.error.clone().unwrap_or_default(),
            });
        }
    }

    Ok(report)
}
