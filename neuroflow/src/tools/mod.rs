//! External tool invocation.
//!
//! Stages describe the tool they need as a [`ToolCommand`] and hand it to a
//! [`ToolRunner`]. [`ProcessRunner`] spawns real processes; the `testing`
//! module provides a recording runner.

mod command;
mod runner;

pub use command::ToolCommand;
pub use runner::{ProcessRunner, ToolInvocation, ToolRunner};
