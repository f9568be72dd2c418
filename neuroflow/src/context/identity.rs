//! Run identity for tracking pipeline executions.

use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one invocation of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this pipeline run.
    pub pipeline_run_id: Uuid,

    /// When the run started.
    pub started_at: Timestamp,

    /// Host the run executes on, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates a new run identity with a generated pipeline run ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pipeline_run_id(Uuid::new_v4())
    }

    /// Creates a run identity with a specific pipeline run ID.
    #[must_use]
    pub fn with_pipeline_run_id(pipeline_run_id: Uuid) -> Self {
        Self {
            pipeline_run_id,
            started_at: Utc::now(),
            host: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
        }
    }
}
