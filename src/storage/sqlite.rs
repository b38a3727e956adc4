//! `SQLite` storage implementation.

use crate::error::{Result, ThreadkeepError};
use crate::import::ledger;
use crate::model::{Branch, Conversation, ImportRecord, Message, Sender};
use crate::storage::schema::apply_schema;
use crate::util::parse_stored_timestamp;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-based storage backend.
///
/// One connection, one writer: imports take the write lock for their whole
/// transaction via `BEGIN IMMEDIATE`.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open a connection to the database at the given path, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a new connection with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for read-only helpers and ledger writes.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one all-or-nothing write transaction.
    ///
    /// Commits when `f` returns `Ok`; otherwise rolls back so the store is left
    /// exactly as it was before the call. Commit and rollback failures surface
    /// as [`ThreadkeepError::Transaction`].
    ///
    /// # Errors
    ///
    /// Returns the error produced by `f`, or a transaction error.
    pub fn write_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        let mut tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| ThreadkeepError::Transaction {
                stage: "begin",
                source,
            })?;

        match f(&mut tx) {
            Ok(value) => {
                tx.commit().map_err(|source| ThreadkeepError::Transaction {
                    stage: "commit",
                    source,
                })?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().map_err(|source| ThreadkeepError::Transaction {
                    stage: "rollback",
                    source,
                })?;
                Err(err)
            }
        }
    }

    /// List ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_imports(&self, limit: Option<usize>) -> Result<Vec<ImportRecord>> {
        ledger::list_imports(&self.conn, limit)
    }

    /// Fetch a conversation by external UUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_conversation(&self, uuid: &str) -> Result<Option<Conversation>> {
        let conversation = self
            .conn
            .query_row(
                "SELECT id, uuid, name, created_at, updated_at, message_count, imported_at
                 FROM conversations WHERE uuid = ?",
                [uuid],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        name: row.get(2)?,
                        created_at: parse_stored_timestamp(&row.get::<_, String>(3)?),
                        updated_at: parse_stored_timestamp(&row.get::<_, String>(4)?),
                        message_count: row.get(5)?,
                        imported_at: parse_stored_timestamp(&row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()?;
        Ok(conversation)
    }

    /// Count conversations in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_conversations(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Count stored messages of one conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_messages(&self, conversation_uuid: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN conversations c ON m.conversation_id = c.id
             WHERE c.uuid = ?",
            [conversation_uuid],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// List the branches of a conversation in creation order (main first).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_branches(&self, conversation_uuid: &str) -> Result<Vec<Branch>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.conversation_id, b.name, b.parent_branch_id, b.created_at
             FROM branches b
             JOIN conversations c ON b.conversation_id = c.id
             WHERE c.uuid = ?
             ORDER BY b.id",
        )?;
        let branches = stmt
            .query_map([conversation_uuid], |row| {
                Ok(Branch {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    name: row.get(2)?,
                    parent_branch_id: row.get(3)?,
                    created_at: parse_stored_timestamp(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(branches)
    }

    /// List the messages of a conversation in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored sender is invalid.
    pub fn list_messages(&self, conversation_uuid: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.uuid, m.conversation_id, m.sender, m.text, m.created_at,
                    m.parent_id, m.branch_id, m.sequence
             FROM messages m
             JOIN conversations c ON m.conversation_id = c.id
             WHERE c.uuid = ?
             ORDER BY m.id",
        )?;
        let rows = stmt
            .query_map([conversation_uuid], |row| {
                Ok((
                    Message {
                        id: row.get(0)?,
                        uuid: row.get(1)?,
                        conversation_id: row.get(2)?,
                        sender: Sender::Human,
                        text: row.get(4)?,
                        created_at: parse_stored_timestamp(&row.get::<_, String>(5)?),
                        parent_id: row.get(6)?,
                        branch_id: row.get(7)?,
                        sequence: row.get(8)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut message, sender)| {
                message.sender = Sender::from_str(&sender)?;
                Ok(message)
            })
            .collect()
    }

    /// Branch and parent of a stored message, looked up by external UUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_message_branch(&self, message_uuid: &str) -> Result<Option<(i64, Option<i64>)>> {
        let found = self
            .conn
            .query_row(
                "SELECT branch_id, parent_id FROM messages WHERE uuid = ?",
                [message_uuid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(found)
    }
}

#[cfg(test)]
impl SqliteStorage {
    /// Execute raw SQL for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub fn execute_test_sql(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
