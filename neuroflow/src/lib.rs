//! # Neuroflow
//!
//! Orchestrates the MRI lesion-segmentation pipeline over a directory of
//! T1-weighted scans.
//!
//! Every scan runs through four external tools, in a fixed order, each
//! consuming the previous stage's declared output:
//!
//! - **Extraction**: ROBEX skull stripping
//! - **Registration**: antsRegistrationSyN onto an atlas
//! - **Normalization**: ImageMath intensity normalization
//! - **Segmentation**: nnU-Net lesion prediction
//!
//! A scan whose four stages all succeed yields exactly one
//! `<subject>_mask.nii.gz` in the output directory. A failed scan yields no
//! mask, and by default does not stop the others.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use neuroflow::prelude::*;
//!
//! let config = NeuroflowConfig::load(None)?;
//! let report = run_pipeline(&config.input_dir, &config.output_dir, &config.pipeline).await?;
//! println!("{} of {} scans segmented", report.totals.succeeded, report.totals.scans);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod tools;
pub mod utils;

pub use errors::NeuroflowError;
pub use pipeline::run_pipeline;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{NeuroflowConfig, PipelineConfig, ToolPaths};
    pub use crate::context::{RunIdentity, StageContext};
    pub use crate::core::{Scan, StageName, StageOutput, StagePaths, StageStatus};
    pub use crate::errors::{NeuroflowError, PipelineValidationError, ToolError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        run_pipeline, run_pipeline_with, CleanupPolicy, FailureMode, Orchestrator, Pipeline,
        PipelineBuilder, RunOptions, RunReport, ScanStatus, StageSpec,
    };
    pub use crate::stages::Stage;
    pub use crate::tools::{ProcessRunner, ToolCommand, ToolRunner};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
