//! Neuroflow - command-line entry point
//!
//! Runs every scan in the input directory through ROBEX, ANTs registration,
//! ImageMath normalization and nnU-Net segmentation.
//!
//! Exit codes: 0 when every scan produced a mask, 1 when any scan failed or
//! the run was aborted, 2 for configuration or input errors found before
//! any tool ran.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use neuroflow::config::{NeuroflowConfig, CONFIG_ENV};
use neuroflow::pipeline::{preflight, run_pipeline_with, FailureMode, RunOptions};
use neuroflow::NeuroflowError;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Command-line arguments for neuroflow
#[derive(Parser, Debug)]
#[command(name = "neuroflow")]
#[command(about = "MRI lesion segmentation pipeline orchestrator")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Directory of raw .nii.gz scans
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory receiving <subject>_mask.nii.gz
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory for intermediate stage outputs
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Stop the whole run at the first failed scan
    #[arg(long)]
    fail_fast: bool,

    /// Number of scans processed concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Validate configuration and inputs, then exit without running tools
    #[arg(long)]
    check: bool,
}

impl Args {
    /// Applies command-line overrides, the highest-priority layer.
    fn apply_to(&self, config: &mut NeuroflowConfig) {
        if let Some(ref dir) = self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(ref dir) = self.work_dir {
            config.pipeline.work_dir = Some(dir.clone());
        }
        if self.fail_fast {
            config.pipeline.failure_mode = FailureMode::FailFast;
        }
        if let Some(jobs) = self.jobs {
            config.pipeline.max_concurrent_scans = jobs;
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<NeuroflowError>()
                .map_or(1, NeuroflowError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = NeuroflowConfig::load(args.config.as_deref())?;
    config.apply_env()?;
    args.apply_to(&mut config);

    info!("Input directory: {}", config.input_dir.display());
    info!("Output directory: {}", config.output_dir.display());

    if args.check {
        let checked = preflight(&config.input_dir, &config.output_dir, &config.pipeline).await?;
        info!(scans = checked.scans.len(), "Configuration and inputs are valid");
        return Ok(ExitCode::SUCCESS);
    }

    let options = RunOptions::default();
    let token = options.cancellation.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the running stages");
            token.cancel("interrupted");
        }
    });

    let report = run_pipeline_with(
        &config.input_dir,
        &config.output_dir,
        &config.pipeline,
        options,
    )
    .await?;

    for scan in report.failed_scans() {
        error!(
            subject = %scan.subject_id,
            stage = ?scan.failed_stage,
            "No mask for {}: {}",
            scan.subject_id,
            scan.error.as_deref().unwrap_or("unknown error")
        );
    }
    info!(
        succeeded = report.totals.succeeded,
        scans = report.totals.scans,
        "Done"
    );

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
