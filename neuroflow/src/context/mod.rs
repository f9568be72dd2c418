//! Context for pipeline execution.
//!
//! This module provides:
//! - The run identity shared by every scan of one invocation
//! - The per-stage context carrying the declared input and output paths

mod identity;
mod stage;

pub use identity::RunIdentity;
pub use stage::StageContext;
