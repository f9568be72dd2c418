//! Per-invocation context handed to a stage.

use crate::core::StageName;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Everything a stage needs to run once for one scan.
///
/// The orchestrator builds it so that `input` is the previous stage's
/// declared output (or the raw scan for the first stage) and `output` is
/// this stage's declared output. The output's parent directory already
/// exists when the stage is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    pipeline_run_id: Uuid,
    subject_id: String,
    stage: StageName,
    input: PathBuf,
    output: PathBuf,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        pipeline_run_id: Uuid,
        subject_id: impl Into<String>,
        stage: StageName,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline_run_id,
            subject_id: subject_id.into(),
            stage,
            input: input.into(),
            output: output.into(),
        }
    }

    /// The run this invocation belongs to.
    #[must_use]
    pub fn pipeline_run_id(&self) -> Uuid {
        self.pipeline_run_id
    }

    /// The subject being processed.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// The stage being executed.
    #[must_use]
    pub fn stage(&self) -> StageName {
        self.stage
    }

    /// The volume to read.
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The volume the stage must write.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }
}
