//! Testing utilities for neuroflow pipelines.
//!
//! This module provides:
//! - Mock stages that write deterministic volumes
//! - A recording tool runner
//! - Assertions over stage outputs and run reports
//! - An on-disk workspace fixture

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_failed_at, assert_output_failed, assert_output_status, assert_output_succeeded,
    assert_scan_status, assert_volume_exists,
};
pub use fixtures::TestWorkspace;
pub use mocks::{mock_stages, mock_volume_bytes, CallLog, MockStage, RecordingRunner};
