//! Cooperative cancellation of a pipeline run.
//!
//! A run is cancelled when a scan fails under `fail_fast` or when the
//! process is interrupted. In-flight scans observe the token between
//! stages; running tools are never killed mid-write.

mod token;

pub use token::CancellationToken;
