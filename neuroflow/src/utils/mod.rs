//! Utility functions for timestamps, digests and filesystem handling.

mod digest;
mod fs;
pub mod timestamps;

pub use digest::sha256_file;
pub use fs::{absolutize, ensure_executable, is_readable_volume};
pub use timestamps::{format_timestamp, iso_timestamp, Timestamp};
