//! Error types and handling for `threadkeep`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Fatal categories (I/O, format, transaction) abort an import
//! - Per-conversation failures are collected, not returned
//! - Provides recovery hints for user-facing errors

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `threadkeep` operations.
#[derive(Error, Debug)]
pub enum ThreadkeepError {
    // === Input Errors ===
    /// Export file does not exist.
    #[error("Export file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export document is malformed or misses a required field.
    #[error("{}", format_error_message(.index.as_deref(), .reason))]
    Format {
        /// Position of the offending record (e.g. `conversation 3, message 7`).
        index: Option<String>,
        reason: String,
    },

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Import Errors ===
    /// The same file content was already imported successfully.
    #[error("File already imported: {path} (hash: {hash})")]
    DuplicateImport { path: PathBuf, hash: String },

    /// A single conversation could not be staged.
    #[error("Conversation {uuid}: {reason}")]
    Conversation { uuid: String, reason: String },

    // === Storage Errors ===
    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Commit or rollback of the import transaction failed.
    #[error("Transaction {stage} failed: {source}")]
    Transaction {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    // === Configuration Errors ===
    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_error_message(index: Option<&str>, reason: &str) -> String {
    match index {
        Some(index) => format!("Invalid export: {index}: {reason}"),
        None => format!("Invalid export: {reason}"),
    }
}

impl ThreadkeepError {
    /// Create a format error without a record position.
    #[must_use]
    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            index: None,
            reason: reason.into(),
        }
    }

    /// Create a format error pointing at a specific record.
    #[must_use]
    pub fn format_at(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            index: Some(index.into()),
            reason: reason.into(),
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a per-conversation error.
    #[must_use]
    pub fn conversation(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversation {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Is this the benign "already imported" signal?
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateImport { .. })
    }

    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::Format { .. }
                | Self::Json(_)
                | Self::DuplicateImport { .. }
                | Self::Config(_)
                | Self::Validation { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::FileNotFound { .. } => Some("Check the path of the export file"),
            Self::DuplicateImport { .. } => {
                Some("Nothing to do; use --force to process the file again")
            }
            Self::Format { .. } | Self::Json(_) => {
                Some("Re-download the export; the file appears truncated or corrupt")
            }
            Self::Transaction { .. } => {
                Some("Another process may hold the database; retry or raise --lock-timeout")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error.
    ///
    /// Duplicate imports exit with 2 so callers can tell "nothing to do"
    /// apart from a real failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_duplicate() { 2 } else { 1 }
    }
}

/// Result type using `ThreadkeepError`.
pub type Result<T> = std::result::Result<T, ThreadkeepError>;
