//! Stage specifications.

use crate::core::StageName;
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::sync::Arc;

/// Specification for a single stage in the pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The pipeline position this spec fills.
    pub name: StageName,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: StageName, runner: Arc<dyn Stage>) -> Self {
        Self { name, runner }
    }

    /// Creates a specification named after the runner.
    #[must_use]
    pub fn from_runner(runner: Arc<dyn Stage>) -> Self {
        Self {
            name: runner.name(),
            runner,
        }
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner implements a different stage.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let runner_name = self.runner.name();
        if runner_name != self.name {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is implemented by a '{}' runner",
                self.name, runner_name
            ))
            .with_stages(vec![self.name.to_string(), runner_name.to_string()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStage;

    #[test]
    fn test_stage_spec_creation() {
        let spec = StageSpec::from_runner(Arc::new(MockStage::new(StageName::Registration)));
        assert_eq!(spec.name, StageName::Registration);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_stage_spec_mismatched_runner() {
        let spec = StageSpec::new(
            StageName::Extraction,
            Arc::new(MockStage::new(StageName::Segmentation)),
        );
        let err = spec.validate().unwrap_err();
        assert_eq!(err.stages, vec!["extraction", "segmentation"]);
    }
}
