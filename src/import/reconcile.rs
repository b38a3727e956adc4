//! Branch reconciliation.
//!
//! Messages are walked once, left to right, in export order. Each new message
//! is placed by looking only at its declared parent:
//!
//! - no parent, or a parent that resolves nowhere: main branch, no parent link
//! - parent in another conversation, from this import or an earlier one:
//!   parent link kept, main branch
//! - parent without a child in its own branch yet: continue that branch
//! - parent that already has a child in its branch: fork a new branch off it
//!
//! A message UUID already stored under any conversation is skipped, never
//! re-inserted. Every inserted message is recorded immediately, so later messages in the
//! same pass can use it as a parent.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;

use crate::error::Result;
use crate::import::loader::{ExistingState, find_stored_message};
use crate::import::parser::ExportMessage;
use crate::import::writer::{
    NewMessage, create_branch, has_child_in_branch, insert_message, next_branch_name,
};
use crate::util::parse_timestamp;

/// Where a stored message lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub id: i64,
    pub conversation_id: i64,
    pub branch_id: i64,
}

/// Message UUID to local reference, shared across the conversations of one import.
///
/// Only conversations whose writes survived are merged in, so a reference
/// found here always points at a row that exists in the transaction.
#[derive(Debug, Default)]
pub struct IdMap {
    refs: HashMap<String, MessageRef>,
}

impl IdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<MessageRef> {
        self.refs.get(uuid).copied()
    }

    pub fn insert(&mut self, uuid: String, reference: MessageRef) {
        self.refs.insert(uuid, reference);
    }

    /// Merge the references produced by one committed conversation.
    pub fn extend(&mut self, resolved: HashMap<String, MessageRef>) {
        self.refs.extend(resolved);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Counts and new references produced by reconciling one conversation.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub messages_imported: usize,
    pub messages_skipped: usize,
    pub branches_created: usize,
    /// References of the messages inserted by this pass.
    pub resolved: HashMap<String, MessageRef>,
}

/// Reconciles the messages of one conversation against stored state.
pub struct BranchReconciler<'a> {
    conn: &'a Connection,
    existing: &'a ExistingState,
    shared: &'a IdMap,
    /// Timestamp used for branch names and for messages without their own.
    now: DateTime<Utc>,
    fallback_created_at: DateTime<Utc>,
    /// Messages found stored under other conversations during this pass.
    stored_elsewhere: HashMap<String, MessageRef>,
    outcome: ReconcileOutcome,
}

impl<'a> BranchReconciler<'a> {
    #[must_use]
    pub fn new(
        conn: &'a Connection,
        existing: &'a ExistingState,
        shared: &'a IdMap,
        now: DateTime<Utc>,
        fallback_created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conn,
            existing,
            shared,
            now,
            fallback_created_at,
            stored_elsewhere: HashMap::new(),
            outcome: ReconcileOutcome::default(),
        }
    }

    /// Place and insert every new message.
    ///
    /// # Errors
    ///
    /// Returns the first insert, branch or timestamp error; the caller is
    /// expected to discard everything this pass wrote.
    pub fn reconcile(mut self, messages: &[ExportMessage]) -> Result<ReconcileOutcome> {
        for (sequence, message) in messages.iter().enumerate() {
            self.place(i64::try_from(sequence).unwrap_or(i64::MAX), message)?;
        }
        Ok(self.outcome)
    }

    fn place(&mut self, sequence: i64, message: &ExportMessage) -> Result<()> {
        let uuid = message.uuid.as_str();
        if self.is_known(uuid) {
            self.outcome.messages_skipped += 1;
            return Ok(());
        }
        if let Some(stored) = find_stored_message(self.conn, uuid)? {
            tracing::debug!(
                message = uuid,
                stored_conversation_id = stored.conversation_id,
                "Message already stored under another conversation; skipping"
            );
            self.stored_elsewhere.insert(uuid.to_string(), stored);
            self.outcome.messages_skipped += 1;
            return Ok(());
        }

        let (parent_id, branch_id) = match message.parent_uuid() {
            None => (None, self.existing.main_branch_id),
            Some(parent_uuid) => match self.resolve(parent_uuid)? {
                None => {
                    tracing::debug!(
                        message = uuid,
                        parent = parent_uuid,
                        "Parent not found; attaching to main branch"
                    );
                    (None, self.existing.main_branch_id)
                }
                Some(parent) if parent.conversation_id != self.existing.conversation_id => {
                    (Some(parent.id), self.existing.main_branch_id)
                }
                Some(parent) => (Some(parent.id), self.branch_for_child(parent_uuid, parent)?),
            },
        };

        let created_at = if message.created_at.trim().is_empty() {
            self.fallback_created_at
        } else {
            parse_timestamp(&message.created_at, "created_at")?
        };

        let id = insert_message(
            self.conn,
            &NewMessage {
                uuid,
                conversation_id: self.existing.conversation_id,
                sender: message.sender()?,
                text: message.text(),
                created_at,
                parent_id,
                branch_id,
                sequence,
            },
        )?;

        self.outcome.messages_imported += 1;
        self.outcome.resolved.insert(
            uuid.to_string(),
            MessageRef {
                id,
                conversation_id: self.existing.conversation_id,
                branch_id,
            },
        );
        Ok(())
    }

    /// Branch a new child of `parent` belongs on, forking if the parent's
    /// branch already continues past it.
    fn branch_for_child(&mut self, parent_uuid: &str, parent: MessageRef) -> Result<i64> {
        if !has_child_in_branch(self.conn, parent.id, parent.branch_id)? {
            return Ok(parent.branch_id);
        }

        let name = next_branch_name(self.conn, self.existing.conversation_id, self.now)?;
        let branch_id = create_branch(
            self.conn,
            self.existing.conversation_id,
            &name,
            Some(parent.branch_id),
            self.now,
        )?;
        self.outcome.branches_created += 1;
        tracing::debug!(
            parent = parent_uuid,
            branch = %name,
            parent_branch_id = parent.branch_id,
            "Fork detected; created branch"
        );
        Ok(branch_id)
    }

    fn is_known(&self, uuid: &str) -> bool {
        self.existing.contains(uuid)
            || self.outcome.resolved.contains_key(uuid)
            || self.shared.get(uuid).is_some()
            || self.stored_elsewhere.contains_key(uuid)
    }

    /// Find a parent in this pass, the conversation, the shared map, or
    /// anywhere else in the store.
    fn resolve(&mut self, uuid: &str) -> Result<Option<MessageRef>> {
        let known = self
            .outcome
            .resolved
            .get(uuid)
            .copied()
            .or_else(|| self.existing.resolve(uuid))
            .or_else(|| self.shared.get(uuid))
            .or_else(|| self.stored_elsewhere.get(uuid).copied());
        if known.is_some() {
            return Ok(known);
        }

        let stored = find_stored_message(self.conn, uuid)?;
        if let Some(reference) = stored {
            self.stored_elsewhere.insert(uuid.to_string(), reference);
        }
        Ok(stored)
    }
}
