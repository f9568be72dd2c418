//! Stage trait and the external tool adapters.
//!
//! Each stage wraps one external tool: it reads `ctx.input()`, writes
//! `ctx.output()` and reports the outcome as a [`StageOutput`]. Whether the
//! output really exists is checked by the orchestrator, not the stage.

mod extraction;
mod normalization;
mod registration;
mod segmentation;

pub use extraction::RobexStage;
pub use normalization::NormalizeStage;
pub use registration::AntsRegistrationStage;
pub use segmentation::NnUnetStage;

use crate::context::StageContext;
use crate::core::{StageName, StageOutput};
use crate::tools::{ToolCommand, ToolRunner};
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// Trait for pipeline stages.
///
/// Implementations must not panic; every failure is reported through
/// [`StageOutput::fail`].
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the pipeline position this stage implements.
    fn name(&self) -> StageName;

    /// Executes the stage for one scan.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Declared input and output paths for this invocation
    ///
    /// # Returns
    ///
    /// [`StageOutput::ok`] naming the written volume, or a failure.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Runs `command` and maps the result onto a stage output for `output`.
pub(crate) async fn run_tool(
    runner: &dyn ToolRunner,
    command: ToolCommand,
    output: &Path,
) -> StageOutput {
    let command_line = command.display();
    match runner.run(&command).await {
        Ok(invocation) => StageOutput::ok(output)
            .add_metadata("command", serde_json::json!(command_line))
            .add_metadata("exit_code", serde_json::json!(invocation.exit_code)),
        Err(e) => StageOutput::fail(e.to_string())
            .add_metadata("command", serde_json::json!(command_line))
            .add_metadata("tool_error", serde_json::to_value(&e).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::errors::ToolError;
    use crate::testing::RecordingRunner;

    #[tokio::test]
    async fn test_run_tool_success_metadata() {
        let runner = RecordingRunner::new();
        let cmd = ToolCommand::new("robex", "/opt/runROBEX.sh").arg("/in.nii.gz");

        let output = run_tool(&runner, cmd, Path::new("/out.nii.gz")).await;

        assert_eq!(output.status, StageStatus::Ok);
        assert_eq!(output.output_path(), Some(Path::new("/out.nii.gz")));
        assert_eq!(
            output.metadata.get("command"),
            Some(&serde_json::json!("/opt/runROBEX.sh /in.nii.gz"))
        );
        assert_eq!(runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_run_tool_failure_metadata() {
        let runner = RecordingRunner::new()
            .fail_tool("robex", ToolError::non_zero_exit("robex", Some(1), "segfault"));
        let cmd = ToolCommand::new("robex", "/opt/runROBEX.sh");

        let output = run_tool(&runner, cmd, Path::new("/out.nii.gz")).await;

        assert_eq!(output.status, StageStatus::Fail);
        assert!(output.error.as_deref().unwrap().contains("segfault"));
        assert_eq!(output.metadata["tool_error"]["type"], "non_zero_exit");
    }
}
