//! Write primitives used while staging one import.
//!
//! Every function here takes a plain `&Connection` so it can run against the
//! import transaction or a per-conversation savepoint. Nothing in this module
//! deletes rows: conversations are updated in place by UUID, branches and
//! messages are only ever inserted.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::error::Result;
use crate::model::Sender;
use crate::util::format_timestamp;

/// Conversation columns taken from the export.
#[derive(Debug, Clone)]
pub struct ConversationRow<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub imported_at: DateTime<Utc>,
}

/// Result of a conversation upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationUpsert {
    pub id: i64,
    /// True when the UUID was seen for the first time.
    pub created: bool,
}

/// A message about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub uuid: &'a str,
    pub conversation_id: i64,
    pub sender: Sender,
    pub text: &'a str,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
    pub branch_id: i64,
    pub sequence: i64,
}

/// Insert a conversation, or update the existing row with the same UUID in place.
///
/// The row id is preserved on update; the row is never deleted and
/// re-inserted, so messages and branches referencing it are untouched.
/// `created_at` is only written on first sight.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn upsert_conversation(
    conn: &Connection,
    row: &ConversationRow<'_>,
) -> Result<ConversationUpsert> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM conversations WHERE uuid = ?",
            [row.uuid],
            |r| r.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE conversations SET name = ?, updated_at = ?, imported_at = ? WHERE id = ?",
            rusqlite::params![
                row.name,
                format_timestamp(&row.updated_at),
                format_timestamp(&row.imported_at),
                id
            ],
        )?;
        return Ok(ConversationUpsert { id, created: false });
    }

    conn.execute(
        "INSERT INTO conversations (uuid, name, created_at, updated_at, message_count, imported_at)
         VALUES (?, ?, ?, ?, 0, ?)",
        rusqlite::params![
            row.uuid,
            row.name,
            format_timestamp(&row.created_at),
            format_timestamp(&row.updated_at),
            format_timestamp(&row.imported_at),
        ],
    )?;
    Ok(ConversationUpsert {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Insert a branch and return its id.
///
/// # Errors
///
/// Returns an error if the insert fails (e.g. duplicate name in the conversation).
pub fn create_branch(
    conn: &Connection,
    conversation_id: i64,
    name: &str,
    parent_branch_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO branches (conversation_id, name, parent_branch_id, created_at)
         VALUES (?, ?, ?, ?)",
        rusqlite::params![
            conversation_id,
            name,
            parent_branch_id,
            format_timestamp(&created_at)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Name for the next fork branch of a conversation.
///
/// `branch-<unix seconds>-<ordinal>`, where the ordinal is one past the
/// number of branches the conversation already has. Branches are never
/// deleted, so the ordinal alone keeps names unique per conversation even when
/// several forks land within the same second.
///
/// # Errors
///
/// Returns an error if the count query fails.
pub fn next_branch_name(
    conn: &Connection,
    conversation_id: i64,
    now: DateTime<Utc>,
) -> Result<String> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM branches WHERE conversation_id = ?",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(format!("branch-{}-{}", now.timestamp(), existing + 1))
}

/// Does `parent_id` already have a child recorded in `branch_id`?
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_child_in_branch(conn: &Connection, parent_id: i64, branch_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM messages WHERE parent_id = ? AND branch_id = ? LIMIT 1",
            [parent_id, branch_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a message and return its id.
///
/// # Errors
///
/// Returns an error if the insert fails (e.g. UUID already stored).
pub fn insert_message(conn: &Connection, message: &NewMessage<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages
            (uuid, conversation_id, sender, text, created_at, parent_id, branch_id, sequence)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            message.uuid,
            message.conversation_id,
            message.sender.as_str(),
            message.text,
            format_timestamp(&message.created_at),
            message.parent_id,
            message.branch_id,
            message.sequence,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Recompute the denormalized message count from the stored rows.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn refresh_message_count(conn: &Connection, conversation_id: i64) -> Result<i64> {
    conn.execute(
        "UPDATE conversations
         SET message_count = (SELECT COUNT(*) FROM messages WHERE conversation_id = ?1)
         WHERE id = ?1",
        [conversation_id],
    )?;
    let count = conn.query_row(
        "SELECT message_count FROM conversations WHERE id = ?",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Run `f` inside a savepoint of `tx`.
///
/// On error only the savepoint's writes are undone; the surrounding
/// transaction stays open for sibling conversations.
///
/// # Errors
///
/// Returns the error produced by `f`, or a database error from the savepoint itself.
pub fn in_savepoint<F, R>(tx: &mut Transaction<'_>, f: F) -> Result<R>
where
    F: FnOnce(&Connection) -> Result<R>,
{
    let mut savepoint = tx.savepoint()?;
    match f(&savepoint) {
        Ok(value) => {
            savepoint.commit()?;
            Ok(value)
        }
        Err(err) => {
            savepoint.rollback()?;
            Err(err)
        }
    }
}
