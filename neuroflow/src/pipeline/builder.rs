//! Pipeline builder with validation.

use super::StageSpec;
use crate::config::PipelineConfig;
use crate::core::StageName;
use crate::errors::PipelineValidationError;
use crate::stages::{AntsRegistrationStage, NnUnetStage, NormalizeStage, RobexStage, Stage};
use crate::tools::ToolRunner;
use std::sync::Arc;

/// A validated stage list: exactly one runner per stage, in fixed order.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<StageSpec>,
}

impl Pipeline {
    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the runner for one stage.
    #[must_use]
    pub fn runner(&self, name: StageName) -> &Arc<dyn Stage> {
        // Validated at build time: index i holds StageName::ALL[i]
        &self.stages[name.index()].runner
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name).collect()
    }
}

/// Builder for creating validated pipelines.
///
/// Stages must be added in pipeline order; anything else is rejected as
/// soon as it is added.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the next stage, named after its runner.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is out of order or already present.
    pub fn stage(mut self, runner: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(StageSpec::from_runner(runner))?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is already defined",
                spec.name
            ))
            .with_stages(vec![spec.name.to_string()]));
        }

        let expected = StageName::ALL.get(self.stages.len()).copied();
        if expected != Some(spec.name) {
            let after = self
                .stages
                .last()
                .map_or_else(|| "the start".to_string(), |s| format!("'{}'", s.name));
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot follow {after}; stages run in the order {}",
                spec.name,
                StageName::ALL.map(|s| s.as_str()).join(" -> ")
            ))
            .with_stages(self.stage_names_with(spec.name)));
        }

        self.stages.push(spec);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error unless all four stages are present.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.len() != StageName::ALL.len() {
            let missing: Vec<String> = StageName::ALL[self.stages.len()..]
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(PipelineValidationError::new(format!(
                "Pipeline is missing stages: {}",
                missing.join(", ")
            ))
            .with_stages(missing));
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }

    fn stage_names_with(&self, extra: StageName) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| s.name.to_string())
            .chain(std::iter::once(extra.to_string()))
            .collect()
    }

    /// Builds the four tool adapters from configuration.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the fixed order is validated all the same.
    pub fn standard(
        config: &PipelineConfig,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Pipeline, PipelineValidationError> {
        let tools = &config.tools;
        let reg = &config.registration;
        let seg = &config.segmentation;

        Self::new()
            .stage(Arc::new(RobexStage::new(&tools.robex, runner.clone())))?
            .stage(Arc::new(
                AntsRegistrationStage::new(&tools.ants_registration, &reg.atlas, runner.clone())
                    .with_transform(reg.transform.clone())
                    .with_threads(reg.threads),
            ))?
            .stage(Arc::new(NormalizeStage::new(&tools.image_math, runner.clone())))?
            .stage(Arc::new(
                NnUnetStage::new(
                    &tools.nnunet_predict,
                    seg.dataset_id,
                    seg.configuration.clone(),
                    runner,
                )
                .with_folds(seg.folds.clone())
                .with_weights_dir(seg.weights_dir.clone())
                .with_device(seg.device.clone()),
            ))?
            .build()
    }
}
