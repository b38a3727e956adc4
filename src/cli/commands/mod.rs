//! Command implementations.

pub mod branches;
pub mod history;
pub mod import;
