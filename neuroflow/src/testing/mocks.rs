//! Mock stages and tool runners for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::{StageName, StageOutput};
use crate::errors::ToolError;
use crate::stages::Stage;
use crate::tools::{ToolCommand, ToolInvocation, ToolRunner};

/// Shared, ordered log of `(subject, stage)` executions across stages.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, StageName)>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, subject_id: &str, stage: StageName) {
        self.calls.lock().push((subject_id.to_string(), stage));
    }

    /// Returns every recorded call in execution order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, StageName)> {
        self.calls.lock().clone()
    }

    /// Returns the stages executed for one subject, in order.
    #[must_use]
    pub fn stages_for(&self, subject_id: &str) -> Vec<StageName> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| s == subject_id)
            .map(|(_, stage)| *stage)
            .collect()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// Computes the bytes a [`MockStage`] writes for a given input.
///
/// The content is a pure function of the stage name and the input bytes,
/// so repeated runs over identical scans produce identical volumes.
#[must_use]
pub fn mock_volume_bytes(stage: StageName, input: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update(input);
    format!("{}:{}\n", stage, hex::encode(hasher.finalize())).into_bytes()
}

/// A stage that reads its input and writes a deterministic volume.
///
/// Behaviour can be scripted per subject: fail, succeed without writing,
/// or report a path other than the declared output.
#[derive(Debug)]
pub struct MockStage {
    name: StageName,
    failing: HashSet<String>,
    silent: HashSet<String>,
    misreported: HashMap<String, PathBuf>,
    delay: Option<Duration>,
    log: Option<CallLog>,
    contexts: Mutex<Vec<StageContext>>,
}

impl MockStage {
    /// Creates a mock stage that succeeds for every subject.
    #[must_use]
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            failing: HashSet::new(),
            silent: HashSet::new(),
            misreported: HashMap::new(),
            delay: None,
            log: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Fails (without writing) for `subject_id`.
    #[must_use]
    pub fn fail_for(mut self, subject_id: impl Into<String>) -> Self {
        self.failing.insert(subject_id.into());
        self
    }

    /// Reports success for `subject_id` without writing anything.
    #[must_use]
    pub fn skip_output_for(mut self, subject_id: impl Into<String>) -> Self {
        self.silent.insert(subject_id.into());
        self
    }

    /// Writes the declared output but reports `path` instead.
    #[must_use]
    pub fn report_output_for(
        mut self,
        subject_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.misreported.insert(subject_id.into(), path.into());
        self
    }

    /// Sleeps before doing any work.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Records every execution into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Returns the contexts from each call.
    #[must_use]
    pub fn recorded_contexts(&self) -> Vec<StageContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        self.contexts.lock().push(ctx.clone());
        if let Some(ref log) = self.log {
            log.record(ctx.subject_id(), self.name);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let subject = ctx.subject_id();
        if self.failing.contains(subject) {
            return StageOutput::fail(format!("{} failed for {subject}", self.name));
        }
        if self.silent.contains(subject) {
            return StageOutput::ok(ctx.output());
        }

        let input = match tokio::fs::read(ctx.input()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return StageOutput::fail(format!(
                    "cannot read {}: {e}",
                    ctx.input().display()
                ))
            }
        };
        if let Err(e) = tokio::fs::write(ctx.output(), mock_volume_bytes(self.name, &input)).await
        {
            return StageOutput::fail(format!("cannot write {}: {e}", ctx.output().display()));
        }

        match self.misreported.get(subject) {
            Some(path) => StageOutput::ok(path.clone()),
            None => StageOutput::ok(ctx.output()),
        }
    }
}

/// Builds the four mock stages in pipeline order, sharing one call log.
#[must_use]
pub fn mock_stages(log: &CallLog) -> Vec<MockStage> {
    StageName::ALL
        .iter()
        .map(|name| MockStage::new(*name).with_log(log.clone()))
        .collect()
}

/// A tool runner that records commands instead of spawning them.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<ToolCommand>>,
    failures: HashMap<String, ToolError>,
}

impl RecordingRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every command for `tool` fail with `error`.
    #[must_use]
    pub fn fail_tool(mut self, tool: impl Into<String>, error: ToolError) -> Self {
        self.failures.insert(tool.into(), error);
        self
    }

    /// Returns all recorded commands.
    #[must_use]
    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolInvocation, ToolError> {
        self.commands.lock().push(command.clone());
        match self.failures.get(&command.tool) {
            Some(error) => Err(error.clone()),
            None => Ok(ToolInvocation {
                exit_code: Some(0),
                ..ToolInvocation::default()
            }),
        }
    }
}
