//! `threadkeep`: incremental, branch-aware archive for chat export files.
//!
//! Exports are snapshots that only ever grow. Each import reconciles a new
//! snapshot against what is already stored: known messages are skipped, new
//! messages are attached to their parent's branch, and a second reply to the
//! same message forks a new branch. Nothing stored is ever deleted.

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod output;
pub mod storage;
pub mod util;

pub use error::{Result, ThreadkeepError};
pub use import::{ImportConfig, Importer};
pub use model::ImportStats;
