//! Atlas registration with `antsRegistrationSyN.sh`.

use super::{run_tool, Stage};
use crate::context::StageContext;
use crate::core::{registration_prefix, StageName, StageOutput, WARPED_SUFFIX};
use crate::tools::{ToolCommand, ToolRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Non-linear registration of the extracted brain onto the atlas.
///
/// antsRegistrationSyN takes an output *prefix*; the declared output must
/// therefore end in `Warped.nii.gz` so the prefix can be recovered from it.
#[derive(Debug, Clone)]
pub struct AntsRegistrationStage {
    program: PathBuf,
    atlas: PathBuf,
    transform: Option<String>,
    threads: Option<u32>,
    runner: Arc<dyn ToolRunner>,
}

impl AntsRegistrationStage {
    /// Creates the stage for the given script and fixed atlas image.
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        atlas: impl Into<PathBuf>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            atlas: atlas.into(),
            transform: None,
            threads: None,
            runner,
        }
    }

    /// Sets the transform type (`-t`), e.g. `s` for rigid+affine+SyN.
    #[must_use]
    pub fn with_transform(mut self, transform: Option<String>) -> Self {
        self.transform = transform;
        self
    }

    /// Sets the thread count (`-n`).
    #[must_use]
    pub fn with_threads(mut self, threads: Option<u32>) -> Self {
        self.threads = threads;
        self
    }

    /// Builds the command for one invocation.
    ///
    /// Returns `None` when the declared output does not end in
    /// `Warped.nii.gz`.
    #[must_use]
    pub fn command(&self, ctx: &StageContext) -> Option<ToolCommand> {
        let prefix = registration_prefix(ctx.output())?;
        let mut cmd = ToolCommand::new("ants", &self.program)
            .flag("-d", "3")
            .flag("-f", self.atlas.as_os_str())
            .flag("-m", ctx.input().as_os_str())
            .flag("-o", prefix.as_os_str());
        if let Some(ref transform) = self.transform {
            cmd = cmd.flag("-t", transform);
        }
        if let Some(threads) = self.threads {
            cmd = cmd.flag("-n", threads.to_string());
        }
        Some(cmd)
    }
}

#[async_trait]
impl Stage for AntsRegistrationStage {
    fn name(&self) -> StageName {
        StageName::Registration
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(command) = self.command(ctx) else {
            return StageOutput::fail(format!(
                "registration output {} must end in {WARPED_SUFFIX}",
                ctx.output().display()
            ));
        };
        run_tool(self.runner.as_ref(), command, ctx.output()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn ctx(output: &str) -> StageContext {
        StageContext::new(
            Uuid::new_v4(),
            "subjectA",
            StageName::Registration,
            "/work/extraction/subjectA/subjectA.nii.gz",
            output,
        )
    }

    #[tokio::test]
    async fn test_ants_command() {
        let runner = Arc::new(RecordingRunner::new());
        let stage = AntsRegistrationStage::new(
            "/usr/local/bin/antsRegistrationSyN.sh",
            "/workspace/data/atlas/SRI24_atlas.nii",
            runner.clone(),
        );

        let output = stage
            .execute(&ctx("/work/registration/subjectA/subjectA_Warped.nii.gz"))
            .await;
        assert!(output.is_success());

        let commands = runner.commands();
        assert_eq!(
            commands[0].args,
            vec![
                "-d",
                "3",
                "-f",
                "/workspace/data/atlas/SRI24_atlas.nii",
                "-m",
                "/work/extraction/subjectA/subjectA.nii.gz",
                "-o",
                "/work/registration/subjectA/subjectA_",
            ]
        );
    }

    #[tokio::test]
    async fn test_ants_optional_flags() {
        let runner = Arc::new(RecordingRunner::new());
        let stage = AntsRegistrationStage::new("ants.sh", "/atlas.nii", runner.clone())
            .with_transform(Some("s".to_string()))
            .with_threads(Some(8));

        stage
            .execute(&ctx("/work/registration/subjectA/subjectA_Warped.nii.gz"))
            .await;

        let cmd = &runner.commands()[0];
        assert_eq!(cmd.flag_value("-t"), Some("s"));
        assert_eq!(cmd.flag_value("-n"), Some("8"));
    }

    #[tokio::test]
    async fn test_ants_rejects_bad_output_name() {
        let runner = Arc::new(RecordingRunner::new());
        let stage = AntsRegistrationStage::new("ants.sh", "/atlas.nii", runner.clone());

        let output = stage.execute(&ctx("/work/registration/subjectA.nii.gz")).await;
        assert!(output.is_failure());
        assert!(runner.commands().is_empty());
    }
}
