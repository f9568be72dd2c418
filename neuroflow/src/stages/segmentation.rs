//! Lesion segmentation with nnU-Net v2.

use super::{run_tool, Stage};
use crate::context::StageContext;
use crate::core::{nnunet_case_id, StageName, StageOutput, NNUNET_CHANNEL_SUFFIX};
use crate::tools::{ToolCommand, ToolRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable nnU-Net reads the trained model folder from.
pub const NNUNET_RESULTS_ENV: &str = "nnUNet_results";

/// Runs `nnUNetv2_predict` over the directory holding the normalized volume.
///
/// nnU-Net works on folders: the input folder must only contain this
/// subject's `<case>_0000.nii.gz`, and the prediction lands in the output
/// folder as `<case>.nii.gz`.
#[derive(Debug, Clone)]
pub struct NnUnetStage {
    program: PathBuf,
    dataset_id: u32,
    configuration: String,
    folds: Vec<String>,
    weights_dir: Option<PathBuf>,
    device: Option<String>,
    runner: Arc<dyn ToolRunner>,
}

impl NnUnetStage {
    /// Creates the stage for a trained dataset and configuration.
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        dataset_id: u32,
        configuration: impl Into<String>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            dataset_id,
            configuration: configuration.into(),
            folds: vec!["all".to_string()],
            weights_dir: None,
            device: None,
            runner,
        }
    }

    /// Sets the folds passed to `-f`.
    #[must_use]
    pub fn with_folds(mut self, folds: Vec<String>) -> Self {
        self.folds = folds;
        self
    }

    /// Sets the trained model folder exported as `nnUNet_results`.
    #[must_use]
    pub fn with_weights_dir(mut self, weights_dir: Option<PathBuf>) -> Self {
        self.weights_dir = weights_dir;
        self
    }

    /// Sets the inference device (`cuda`, `cpu`, `mps`).
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Builds the command for one invocation.
    ///
    /// # Errors
    ///
    /// Returns a message when the input is not an nnU-Net channel file or
    /// the output name does not match the case id.
    pub fn command(&self, ctx: &StageContext) -> Result<ToolCommand, String> {
        let case_id = nnunet_case_id(ctx.input()).ok_or_else(|| {
            format!(
                "segmentation input {} must be named <case>{NNUNET_CHANNEL_SUFFIX}",
                ctx.input().display()
            )
        })?;
        let expected = format!("{case_id}.nii.gz");
        if ctx.output().file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
            return Err(format!(
                "segmentation output {} must be named {expected}",
                ctx.output().display()
            ));
        }

        let input_dir = ctx.input().parent().unwrap_or_else(|| Path::new("."));
        let output_dir = ctx.output().parent().unwrap_or_else(|| Path::new("."));

        let mut cmd = ToolCommand::new("nnunet", &self.program)
            .flag("-i", input_dir.as_os_str())
            .flag("-o", output_dir.as_os_str())
            .flag("-d", self.dataset_id.to_string())
            .flag("-c", &self.configuration)
            .arg("-f")
            .args(&self.folds);
        if let Some(ref device) = self.device {
            cmd = cmd.flag("-device", device);
        }
        if let Some(ref weights) = self.weights_dir {
            cmd = cmd.env(NNUNET_RESULTS_ENV, weights.display().to_string());
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Stage for NnUnetStage {
    fn name(&self) -> StageName {
        StageName::Segmentation
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        match self.command(ctx) {
            Ok(command) => run_tool(self.runner.as_ref(), command, ctx.output()).await,
            Err(message) => StageOutput::fail(message),
        }
    }
}
