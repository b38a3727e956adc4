//! Core data types for `threadkeep`.
//!
//! This module defines the persisted rows and import bookkeeping:
//! - `Conversation` - A top-level thread keyed by its external UUID
//! - `Branch` - A named linear path of messages within a conversation
//! - `Message` - A single immutable chat message
//! - `ImportRecord` - One ledger entry per import attempt
//! - `ImportStats` - Counts reported back to the caller

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ThreadkeepError;

/// Name of the branch every conversation is rooted at.
pub const MAIN_BRANCH: &str = "main";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Human,
    Assistant,
}

impl Sender {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = ThreadkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "assistant" => Ok(Self::Assistant),
            other => Err(ThreadkeepError::validation(
                "sender",
                format!("invalid sender: {other}"),
            )),
        }
    }
}

/// Outcome recorded in the import ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    Partial,
    Failed,
}

impl ImportStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = ThreadkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(ThreadkeepError::validation(
                "status",
                format!("invalid import status: {other}"),
            )),
        }
    }
}

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
    pub imported_at: DateTime<Utc>,
}

/// A stored branch. `parent_branch_id` is `None` only for the main branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub id: i64,
    pub conversation_id: i64,
    pub name: String,
    pub parent_branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.parent_branch_id.is_none() && self.name == MAIN_BRANCH
    }
}

/// A stored message. Rows are never updated once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub uuid: String,
    pub conversation_id: i64,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
    pub branch_id: i64,
    pub sequence: i64,
}

/// One entry of the import ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRecord {
    pub id: i64,
    pub file_path: String,
    pub file_hash: String,
    pub imported_at: DateTime<Utc>,
    pub conversations_count: i64,
    pub messages_count: i64,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Counts accumulated over one import.
#[derive(Debug, Default, Serialize)]
pub struct ImportStats {
    /// Conversations seen for the first time.
    pub conversations_imported: usize,
    /// Conversations that already existed and were updated in place.
    pub conversations_updated: usize,
    pub messages_imported: usize,
    /// Messages already present in the store.
    pub messages_skipped: usize,
    pub branches_created: usize,
    #[serde(rename = "duration_ms", serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    pub file_hash: String,
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ThreadkeepError>,
}

impl ImportStats {
    /// Ledger status implied by the collected per-conversation errors.
    #[must_use]
    pub fn status(&self) -> ImportStatus {
        let committed = self.conversations_imported + self.conversations_updated;
        match (self.errors.is_empty(), committed) {
            (true, _) => ImportStatus::Success,
            (false, 0) => ImportStatus::Failed,
            (false, _) => ImportStatus::Partial,
        }
    }

    /// Total conversations written by this import.
    #[must_use]
    pub const fn conversations_total(&self) -> usize {
        self.conversations_imported + self.conversations_updated
    }

    /// Collected errors joined for the ledger's `error_message` column.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn serialize_duration_ms<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_millis())
}

fn serialize_errors<S: Serializer>(errors: &[ThreadkeepError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}
