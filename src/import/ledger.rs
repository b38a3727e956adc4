//! Import ledger: one row per import attempt, keyed by file content hash.
//!
//! A hash with a `success` row blocks reprocessing; `partial` and `failed`
//! rows do not. Ledger writes run outside the import transaction so a
//! rolled-back import still leaves its audit trail.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::model::{ImportRecord, ImportStatus};
use crate::util::{format_timestamp, parse_stored_timestamp};

/// Values recorded for one attempt.
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub file_path: &'a Path,
    pub file_hash: &'a str,
    pub conversations_count: usize,
    pub messages_count: usize,
    pub status: ImportStatus,
    pub error_message: Option<String>,
}

/// Has this content hash already been imported successfully?
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_already_imported(conn: &Connection, file_hash: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM import_history WHERE file_hash = ? AND status = 'success'",
        [file_hash],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Append a ledger row.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn record_attempt(
    conn: &Connection,
    entry: &LedgerEntry<'_>,
    recorded_at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO import_history
            (file_path, file_hash, imported_at, conversations_count, messages_count, status, error_message)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            entry.file_path.to_string_lossy(),
            entry.file_hash,
            format_timestamp(&recorded_at),
            i64::try_from(entry.conversations_count).unwrap_or(i64::MAX),
            i64::try_from(entry.messages_count).unwrap_or(i64::MAX),
            entry.status.as_str(),
            entry.error_message,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append a ledger row, logging instead of failing.
pub fn record_attempt_best_effort(conn: &Connection, entry: &LedgerEntry<'_>) {
    match record_attempt(conn, entry, Utc::now()) {
        Ok(id) => tracing::debug!(
            ledger_id = id,
            status = %entry.status,
            hash = %entry.file_hash,
            "Recorded import attempt"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            path = %entry.file_path.display(),
            "Failed to record import attempt in ledger"
        ),
    }
}

/// List ledger rows, newest first.
///
/// # Errors
///
/// Returns an error if the query fails or a stored status is unknown.
pub fn list_imports(conn: &Connection, limit: Option<usize>) -> Result<Vec<ImportRecord>> {
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    let mut stmt = conn.prepare(
        "SELECT id, file_path, file_hash, imported_at, conversations_count, messages_count,
                status, error_message
         FROM import_history
         ORDER BY id DESC
         LIMIT ?",
    )?;

    let rows = stmt
        .query_map([limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(
            |(id, file_path, file_hash, imported_at, conversations, messages, status, error)| {
                Ok(ImportRecord {
                    id,
                    file_path,
                    file_hash,
                    imported_at: parse_stored_timestamp(&imported_at),
                    conversations_count: conversations,
                    messages_count: messages,
                    status: ImportStatus::from_str(&status)?,
                    error_message: error,
                })
            },
        )
        .collect()
}
