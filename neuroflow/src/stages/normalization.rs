//! Intensity normalization with ANTs `ImageMath`.

use super::{run_tool, Stage};
use crate::context::StageContext;
use crate::core::{StageName, StageOutput};
use crate::tools::{ToolCommand, ToolRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Rescales voxel intensities to `[0, 1]` via `ImageMath 3 <out> Normalize <in>`.
#[derive(Debug, Clone)]
pub struct NormalizeStage {
    program: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

impl NormalizeStage {
    /// Creates the stage for the given `ImageMath` binary.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Builds the command for one invocation.
    #[must_use]
    pub fn command(&self, ctx: &StageContext) -> ToolCommand {
        ToolCommand::new("image_math", &self.program)
            .arg("3")
            .path_arg(ctx.output())
            .arg("Normalize")
            .path_arg(ctx.input())
    }
}

#[async_trait]
impl Stage for NormalizeStage {
    fn name(&self) -> StageName {
        StageName::Normalization
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        run_tool(self.runner.as_ref(), self.command(ctx), ctx.output()).await
    }
}
