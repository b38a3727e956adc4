//! Database schema definitions.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the archive database.
pub const SCHEMA_SQL: &str = r"
    -- Conversations: one row per external UUID, updated in place on re-import
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        message_count INTEGER NOT NULL DEFAULT 0,
        imported_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at);
    CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at);

    -- Branches form a tree rooted at the conversation's main branch
    CREATE TABLE IF NOT EXISTS branches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        parent_branch_id INTEGER,
        created_at TEXT NOT NULL,
        UNIQUE (conversation_id, name),
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
        FOREIGN KEY (parent_branch_id) REFERENCES branches(id)
    );
    CREATE INDEX IF NOT EXISTS idx_branches_conversation_id ON branches(conversation_id);

    -- Messages are immutable once inserted
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid TEXT UNIQUE NOT NULL,
        conversation_id INTEGER NOT NULL,
        sender TEXT NOT NULL CHECK (sender IN ('human', 'assistant')),
        text TEXT NOT NULL,
        created_at TEXT NOT NULL,
        parent_id INTEGER,
        branch_id INTEGER NOT NULL,
        sequence INTEGER NOT NULL,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
        FOREIGN KEY (parent_id) REFERENCES messages(id),
        FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_messages_branch_id ON messages(branch_id);
    CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
    CREATE INDEX IF NOT EXISTS idx_messages_parent_branch ON messages(parent_id, branch_id);

    -- Full-text index over message text, maintained on insert
    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        text,
        content = messages,
        content_rowid = id,
        tokenize = 'porter unicode61'
    );
    CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
        INSERT INTO messages_fts(rowid, text) VALUES (new.id, new.text);
    END;

    -- Import ledger
    CREATE TABLE IF NOT EXISTS import_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL,
        file_hash TEXT NOT NULL,
        imported_at TEXT NOT NULL,
        conversations_count INTEGER NOT NULL DEFAULT 0,
        messages_count INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL CHECK (status IN ('success', 'partial', 'failed')),
        error_message TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_import_history_file_hash ON import_history(file_hash);

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`. Only initial creation is
/// handled here; there are no migrations.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set journal mode to WAL so readers don't block the single writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
