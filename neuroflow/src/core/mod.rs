//! Core domain model types for neuroflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage names and status enums
//! - Stage output type with factory methods
//! - Input scans and the stage path convention

mod output;
mod paths;
mod scan;
mod status;

pub use output::StageOutput;
pub use paths::{
    nnunet_case_id, registration_prefix, StagePaths, MASK_SUFFIX, NNUNET_CHANNEL_SUFFIX,
    WARPED_SUFFIX,
};
pub use scan::{discover_scans, subject_id_from_file_name, Scan, SCAN_EXTENSION};
pub use status::{StageName, StageStatus};
