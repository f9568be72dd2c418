//! Brain extraction with ROBEX.

use super::{run_tool, Stage};
use crate::context::StageContext;
use crate::core::{StageName, StageOutput};
use crate::tools::{ToolCommand, ToolRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Skull stripping via `runROBEX.sh <input> <output>`.
#[derive(Debug, Clone)]
pub struct RobexStage {
    script: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

impl RobexStage {
    /// Creates the stage for the given ROBEX launcher script.
    #[must_use]
    pub fn new(script: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            script: script.into(),
            runner,
        }
    }

    /// Builds the command for one invocation.
    #[must_use]
    pub fn command(&self, ctx: &StageContext) -> ToolCommand {
        ToolCommand::new("robex", &self.script)
            .path_arg(ctx.input())
            .path_arg(ctx.output())
    }
}

#[async_trait]
impl Stage for RobexStage {
    fn name(&self) -> StageName {
        StageName::Extraction
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        run_tool(self.runner.as_ref(), self.command(ctx), ctx.output()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_robex_command() {
        let runner = Arc::new(RecordingRunner::new());
        let stage = RobexStage::new("/opt/ROBEX/runROBEX.sh", runner.clone());
        let ctx = StageContext::new(
            Uuid::new_v4(),
            "subjectA",
            StageName::Extraction,
            "/in/subjectA.nii.gz",
            "/work/extraction/subjectA/subjectA.nii.gz",
        );

        let output = stage.execute(&ctx).await;
        assert!(output.is_success());

        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].program, PathBuf::from("/opt/ROBEX/runROBEX.sh"));
        assert_eq!(
            commands[0].args,
            vec![
                "/in/subjectA.nii.gz",
                "/work/extraction/subjectA/subjectA.nii.gz"
            ]
        );
    }
}
