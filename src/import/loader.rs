//! Existing-state loader.
//!
//! Before a conversation is reconciled we read back what the store already
//! holds for it: every stored message UUID with its local id and branch, and
//! the id of the main branch (created on first import).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

use crate::error::Result;
use crate::import::reconcile::MessageRef;
use crate::import::writer::create_branch;
use crate::model::MAIN_BRANCH;

/// Stored state of one conversation.
#[derive(Debug, Clone)]
pub struct ExistingState {
    pub conversation_id: i64,
    pub main_branch_id: i64,
    /// True when the main branch was created by this load.
    pub main_branch_created: bool,
    stored: HashMap<String, MessageRef>,
}

impl ExistingState {
    /// Load stored messages and resolve (or lazily create) the main branch.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or the branch insert fails.
    pub fn load(conn: &Connection, conversation_id: i64, now: DateTime<Utc>) -> Result<Self> {
        let (main_branch_id, main_branch_created) = main_branch(conn, conversation_id, now)?;

        let mut stmt = conn.prepare(
            "SELECT uuid, id, branch_id FROM messages WHERE conversation_id = ?",
        )?;
        let stored = stmt
            .query_map([conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    MessageRef {
                        id: row.get(1)?,
                        conversation_id,
                        branch_id: row.get(2)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        tracing::trace!(
            conversation_id,
            stored = stored.len(),
            main_branch_id,
            "Loaded existing conversation state"
        );

        Ok(Self {
            conversation_id,
            main_branch_id,
            main_branch_created,
            stored,
        })
    }

    /// Is this message UUID already stored for the conversation?
    #[must_use]
    pub fn contains(&self, uuid: &str) -> bool {
        self.stored.contains_key(uuid)
    }

    /// Local reference of a stored message.
    #[must_use]
    pub fn resolve(&self, uuid: &str) -> Option<MessageRef> {
        self.stored.get(uuid).copied()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stored.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}

/// Look up a stored message by UUID in any conversation.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_stored_message(conn: &Connection, uuid: &str) -> Result<Option<MessageRef>> {
    let found = conn
        .query_row(
            "SELECT id, conversation_id, branch_id FROM messages WHERE uuid = ?",
            [uuid],
            |row| {
                Ok(MessageRef {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    branch_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

/// Id of the conversation's main branch, creating it if missing.
///
/// Returns `(id, created)`.
///
/// # Errors
///
/// Returns an error if the lookup or insert fails.
pub fn main_branch(
    conn: &Connection,
    conversation_id: i64,
    now: DateTime<Utc>,
) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM branches WHERE conversation_id = ? AND name = ?",
            rusqlite::params![conversation_id, MAIN_BRANCH],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok((id, false));
    }
    let id = create_branch(conn, conversation_id, MAIN_BRANCH, None, now)?;
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::writer::{
        ConversationRow, NewMessage, insert_message, upsert_conversation,
    };
    use crate::model::Sender;
    use crate::storage::SqliteStorage;

    fn conversation(conn: &Connection) -> i64 {
        let now = Utc::now();
        upsert_conversation(
            conn,
            &ConversationRow {
                uuid: "c1",
                name: "",
                created_at: now,
                updated_at: now,
                imported_at: now,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn first_load_creates_main_branch_once() {
        let storage = SqliteStorage::open_memory().unwrap();
        let conn = storage.conn();
        let conv = conversation(conn);

        let first = ExistingState::load(conn, conv, Utc::now()).unwrap();
        assert!(first.main_branch_created);
        assert!(first.is_empty());

        let second = ExistingState::load(conn, conv, Utc::now()).unwrap();
        assert!(!second.main_branch_created);
        assert_eq!(second.main_branch_id, first.main_branch_id);
        assert_eq!(storage.list_branches("c1").unwrap().len(), 1);
    }

    #[test]
    fn load_resolves_stored_messages() {
        let storage = SqliteStorage::open_memory().unwrap();
        let conn = storage.conn();
        let conv = conversation(conn);
        let state = ExistingState::load(conn, conv, Utc::now()).unwrap();

        let id = insert_message(
            conn,
            &NewMessage {
                uuid: "m1",
                conversation_id: conv,
                sender: Sender::Human,
                text: "hello",
                created_at: Utc::now(),
                parent_id: None,
                branch_id: state.main_branch_id,
                sequence: 0,
            },
        )
        .unwrap();

        let state = ExistingState::load(conn, conv, Utc::now()).unwrap();
        assert!(state.contains("m1"));
        assert!(!state.contains("m2"));
        assert_eq!(state.len(), 1);
        assert_eq!(
            state.resolve("m1"),
            Some(MessageRef {
                id,
                conversation_id: conv,
                branch_id: state.main_branch_id,
            })
        );
    }
}
