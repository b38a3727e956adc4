//! Incremental import of chat export archives.
//!
//! One call to [`Importer::import`] runs the whole pipeline for one file:
//!
//! ```text
//! Hashing -> Dedup-check -> Parsing -> {per conversation: Load -> Reconcile -> Stage} -> Commit -> Ledger-record
//! ```
//!
//! All staged writes share one `BEGIN IMMEDIATE` transaction. Each
//! conversation is staged inside its own savepoint, so a conversation that
//! fails is rolled back on its own and reported in [`ImportStats::errors`]
//! while its siblings continue. Fatal errors (unreadable file, malformed
//! document, commit failure) roll back everything and are returned.

pub mod ledger;
pub mod loader;
pub mod parser;
pub mod reconcile;
pub mod writer;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::time::Instant;

use crate::error::{Result, ThreadkeepError};
use crate::model::{ImportStats, ImportStatus};
use crate::storage::SqliteStorage;
use crate::util::progress::ProgressTracker;
use crate::util::{file_hash, parse_timestamp};

use ledger::LedgerEntry;
use loader::ExistingState;
use parser::{DEFAULT_STREAMING_THRESHOLD, ExportConversation, ExportParser, ParseStrategy};
use reconcile::{BranchReconciler, IdMap, ReconcileOutcome};
use writer::{ConversationRow, in_savepoint, refresh_message_count, upsert_conversation};

/// Configuration for one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    /// Files strictly larger than this many bytes are decoded as a stream.
    pub streaming_threshold: u64,
    /// Process the file even if its hash was already imported successfully.
    pub force: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            force: false,
        }
    }
}

/// Runs imports against one store.
pub struct Importer<'a> {
    storage: &'a mut SqliteStorage,
    config: ImportConfig,
    progress: Option<ProgressTracker>,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub const fn new(storage: &'a mut SqliteStorage, config: ImportConfig) -> Self {
        Self {
            storage,
            config,
            progress: None,
        }
    }

    /// Report per-conversation progress on the given spinner.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Import one export file.
    ///
    /// Returns statistics on success, including partial success where some
    /// conversations were skipped (see [`ImportStats::errors`]). Every attempt
    /// that gets past hashing is recorded in the ledger, except a rejected
    /// duplicate.
    ///
    /// # Errors
    ///
    /// - [`ThreadkeepError::FileNotFound`] / [`ThreadkeepError::Io`] if the file cannot be read
    /// - [`ThreadkeepError::DuplicateImport`] if the content was already imported successfully
    /// - [`ThreadkeepError::Format`] if the document is malformed or misses a required field
    /// - [`ThreadkeepError::Transaction`] if the import transaction cannot begin or commit
    pub fn import(&mut self, path: &Path) -> Result<ImportStats> {
        let result = self.import_file(path);
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        result
    }

    fn import_file(&mut self, path: &Path) -> Result<ImportStats> {
        let started = Instant::now();

        // Step 1: Hashing
        let parser = ExportParser::open(path, self.config.streaming_threshold)?;
        self.set_progress("Hashing export");
        let hash = file_hash(path)?;
        tracing::info!(
            path = %path.display(),
            hash = %hash,
            size = parser.size(),
            "Hashed export file"
        );

        // Step 2: Dedup-check
        if ledger::is_already_imported(self.storage.conn(), &hash)? {
            if self.config.force {
                tracing::info!(hash = %hash, "Export already imported; continuing (--force)");
            } else {
                tracing::info!(hash = %hash, "Export already imported; skipping");
                return Err(ThreadkeepError::DuplicateImport {
                    path: path.to_path_buf(),
                    hash,
                });
            }
        }

        // Steps 3-5: Parse, stage, commit
        let outcome = self.run(&parser, &hash);

        // Step 6: Ledger-record, outside the import transaction
        match outcome {
            Ok(mut stats) => {
                stats.file_hash = hash;
                stats.duration = started.elapsed();
                ledger::record_attempt_best_effort(
                    self.storage.conn(),
                    &LedgerEntry {
                        file_path: path,
                        file_hash: &stats.file_hash,
                        conversations_count: stats.conversations_total(),
                        messages_count: stats.messages_imported,
                        status: stats.status(),
                        error_message: stats.error_summary(),
                    },
                );
                tracing::info!(
                    status = %stats.status(),
                    conversations_imported = stats.conversations_imported,
                    conversations_updated = stats.conversations_updated,
                    messages_imported = stats.messages_imported,
                    messages_skipped = stats.messages_skipped,
                    branches_created = stats.branches_created,
                    errors = stats.errors.len(),
                    duration_ms = u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
                    "Import finished"
                );
                Ok(stats)
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "Import rolled back");
                ledger::record_attempt_best_effort(
                    self.storage.conn(),
                    &LedgerEntry {
                        file_path: path,
                        file_hash: &hash,
                        conversations_count: 0,
                        messages_count: 0,
                        status: ImportStatus::Failed,
                        error_message: Some(err.to_string()),
                    },
                );
                Err(err)
            }
        }
    }

    fn run(&mut self, parser: &ExportParser, hash: &str) -> Result<ImportStats> {
        let now = Utc::now();
        let mut stats = ImportStats::default();
        let mut ids = IdMap::new();
        let progress = self.progress.as_ref();
        let storage = &mut *self.storage;

        match parser.strategy() {
            ParseStrategy::Batch => {
                if let Some(p) = progress {
                    p.set_message("Parsing export");
                }
                let conversations = parser.parse()?;
                tracing::info!(
                    hash,
                    conversations = conversations.len(),
                    strategy = "batch",
                    "Parsed export"
                );
                storage.write_transaction(|tx| {
                    for conversation in &conversations {
                        stage(tx, conversation, &mut ids, &mut stats, progress, now);
                    }
                    Ok(())
                })?;
            }
            ParseStrategy::Streaming => {
                tracing::info!(hash, size = parser.size(), strategy = "streaming", "Streaming export");
                let count = storage.write_transaction(|tx| {
                    parser.stream(|_, conversation| {
                        stage(tx, &conversation, &mut ids, &mut stats, progress, now);
                        Ok(())
                    })
                })?;
                tracing::debug!(conversations = count, "Streamed export");
            }
        }

        tracing::debug!(known_messages = ids.len(), "Committed import transaction");
        Ok(stats)
    }

    fn set_progress(&self, message: &str) {
        if let Some(progress) = &self.progress {
            progress.set_message(message);
        }
    }
}

/// Outcome of staging one conversation.
#[derive(Debug)]
struct StagedConversation {
    created: bool,
    reconciled: ReconcileOutcome,
}

/// Stage one conversation in its own savepoint, folding the result into `stats`.
///
/// A failure is logged and collected; the savepoint is rolled back and the
/// conversation's message references never reach the shared map.
fn stage(
    tx: &mut Transaction<'_>,
    conversation: &ExportConversation,
    ids: &mut IdMap,
    stats: &mut ImportStats,
    progress: Option<&ProgressTracker>,
    now: DateTime<Utc>,
) {
    let uuid = conversation.uuid.as_str();
    if let Some(p) = progress {
        p.set_message(format!("Importing {uuid}"));
    }

    let shared: &IdMap = ids;
    let staged = in_savepoint(tx, |conn| stage_conversation(conn, conversation, shared, now));
    match staged {
        Ok(staged) => {
            let reconciled = staged.reconciled;
            tracing::debug!(
                conversation = uuid,
                created = staged.created,
                imported = reconciled.messages_imported,
                skipped = reconciled.messages_skipped,
                branches = reconciled.branches_created,
                "Staged conversation"
            );
            if staged.created {
                stats.conversations_imported += 1;
            } else {
                stats.conversations_updated += 1;
            }
            stats.messages_imported += reconciled.messages_imported;
            stats.messages_skipped += reconciled.messages_skipped;
            stats.branches_created += reconciled.branches_created;
            ids.extend(reconciled.resolved);
        }
        Err(err) => {
            let err = conversation_error(uuid, err);
            tracing::warn!(conversation = uuid, error = %err, "Skipping conversation");
            stats.errors.push(err);
        }
    }
}

/// Load, reconcile and write one conversation.
fn stage_conversation(
    conn: &Connection,
    conversation: &ExportConversation,
    ids: &IdMap,
    now: DateTime<Utc>,
) -> Result<StagedConversation> {
    let created_at = parse_timestamp(&conversation.created_at, "created_at")?;
    let updated_at = if conversation.updated_at.trim().is_empty() {
        created_at
    } else {
        parse_timestamp(&conversation.updated_at, "updated_at")?
    };

    let upsert = upsert_conversation(
        conn,
        &ConversationRow {
            uuid: &conversation.uuid,
            name: &conversation.name,
            created_at,
            updated_at,
            imported_at: now,
        },
    )?;

    let existing = ExistingState::load(conn, upsert.id, now)?;
    let reconciled = BranchReconciler::new(conn, &existing, ids, now, created_at)
        .reconcile(&conversation.chat_messages)?;
    refresh_message_count(conn, upsert.id)?;

    Ok(StagedConversation {
        created: upsert.created,
        reconciled,
    })
}

fn conversation_error(uuid: &str, err: ThreadkeepError) -> ThreadkeepError {
    match err {
        ThreadkeepError::Conversation { .. } => err,
        other => ThreadkeepError::conversation(uuid, other.to_string()),
    }
}
