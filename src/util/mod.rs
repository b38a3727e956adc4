//! Shared utilities for `threadkeep`.
//!
//! - File content hashing (SHA256)
//! - Timestamp parsing and formatting (RFC3339)
//! - Progress indicators (for long-running imports)

mod hash;
pub mod progress;
pub mod time;

pub use hash::{bytes_hash, file_hash};
pub use time::{format_timestamp, parse_stored_timestamp, parse_timestamp};
