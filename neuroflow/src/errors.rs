//! Error types for the neuroflow orchestrator.
//!
//! Errors fall into three groups: problems with the input scans, problems
//! with the configuration, and failures of an external tool. The first two
//! are detected before any stage runs; tool failures are scoped to a scan.

use crate::core::StageName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Number of trailing stderr lines kept on a tool failure.
pub const STDERR_TAIL_LINES: usize = 20;

/// Result type used throughout the crate.
pub type Result<T, E = NeuroflowError> = std::result::Result<T, E>;

/// The main error type for neuroflow operations.
#[derive(Debug, Error)]
pub enum NeuroflowError {
    /// The configuration is invalid or points at missing tools/data.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The input directory is missing, empty or holds an invalid file.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The stage list does not describe the fixed pipeline.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// An external tool failed.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// The run was aborted after a scan failed in fail-fast mode.
    #[error("Run aborted: scan '{subject}' failed at stage {stage}: {message}")]
    Aborted {
        /// Subject whose scan failed first.
        subject: String,
        /// Stage that failed.
        stage: StageName,
        /// Failure message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NeuroflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an input error.
    #[must_use]
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Returns true for errors raised before any stage was invoked.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Input(_) | Self::Validation(_))
    }

    /// Process exit code for this error.
    ///
    /// Preflight errors exit with 2, everything else with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_preflight() {
            2
        } else {
            1
        }
    }
}

impl From<toml::de::Error> for NeuroflowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid TOML: {err}"))
    }
}

impl From<serde_json::Error> for NeuroflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when the stage list is not the fixed extraction →
/// registration → normalization → segmentation sequence.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors raised by an external tool invocation.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolError {
    /// The process could not be started.
    #[error("Failed to start {tool}: {reason}")]
    SpawnFailed {
        /// The tool name.
        tool: String,
        /// The OS-level reason.
        reason: String,
    },

    /// The process exited with a non-success status.
    #[error("{tool} exited with {}: {stderr}", describe_exit(.exit_code))]
    NonZeroExit {
        /// The tool name.
        tool: String,
        /// Exit code, `None` when terminated by a signal.
        exit_code: Option<i32>,
        /// Tail of the captured stderr.
        stderr: String,
    },

    /// The process succeeded but the declared output is missing or empty.
    #[error("{tool} produced no output at {}", .path.display())]
    MissingOutput {
        /// The tool name.
        tool: String,
        /// The declared output path.
        path: PathBuf,
    },
}

impl ToolError {
    /// Creates a spawn error.
    #[must_use]
    pub fn spawn_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Creates a non-zero exit error, keeping only the stderr tail.
    #[must_use]
    pub fn non_zero_exit(tool: impl Into<String>, exit_code: Option<i32>, stderr: &str) -> Self {
        Self::NonZeroExit {
            tool: tool.into(),
            exit_code,
            stderr: stderr_tail(stderr, STDERR_TAIL_LINES),
        }
    }

    /// Creates a missing output error.
    #[must_use]
    pub fn missing_output(tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingOutput {
            tool: tool.into(),
            path: path.into(),
        }
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(|| "a signal".to_string(), |code| format!("status {code}"))
}

/// Keeps the last `lines` non-empty lines of a process stream.
#[must_use]
pub fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}
