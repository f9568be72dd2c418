//! Running external tools.

use super::ToolCommand;
use crate::errors::ToolError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, info};

/// The captured result of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolInvocation {
    /// Exit code (always 0 for a successful run on Unix).
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// Trait for anything that can execute a [`ToolCommand`].
///
/// Stage adapters only build commands; the runner decides how they are
/// executed, which lets tests record commands instead of spawning them.
#[async_trait]
pub trait ToolRunner: Send + Sync + Debug {
    /// Runs the command to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::SpawnFailed`] if the process cannot start and
    /// [`ToolError::NonZeroExit`] if it exits unsuccessfully.
    async fn run(&self, command: &ToolCommand) -> Result<ToolInvocation, ToolError>;
}

/// Runs tools as child processes with captured output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolInvocation, ToolError> {
        info!(tool = %command.tool, "[CMD] {}", command.display());

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let output = process
            .output()
            .await
            .map_err(|e| ToolError::spawn_failed(&command.tool, e.to_string()))?;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            error!(
                tool = %command.tool,
                exit_code = ?output.status.code(),
                stderr = %stderr,
                "Tool failed"
            );
            return Err(ToolError::non_zero_exit(
                &command.tool,
                output.status.code(),
                &stderr,
            ));
        }

        debug!(tool = %command.tool, duration_ms, stdout = %stdout, "Tool finished");

        Ok(ToolInvocation {
            exit_code: output.status.code(),
            stdout,
            stderr,
            duration_ms,
        })
    }
}
