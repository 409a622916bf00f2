//! Database schema migrations.
//!
//! Version 1 creates the bots, intents, knowledge_chunks, messages and
//! unrecognized_queries tables.

use rusqlite::Connection;
use tracing::info;

use parlance_core::error::ParlanceError;

use crate::db::storage_err;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), ParlanceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(storage_err("Failed to create migrations table"))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(storage_err("Failed to query migration version"))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// Composite values (phrases, responses, routing, embeddings, resolutions)
/// are stored as JSON text. Timestamps are Unix milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), ParlanceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS bots (
            id                TEXT PRIMARY KEY NOT NULL,
            name              TEXT NOT NULL,
            description       TEXT NOT NULL DEFAULT '',
            persona           TEXT NOT NULL DEFAULT '',
            tone              TEXT NOT NULL DEFAULT '',
            fallback_message  TEXT NOT NULL,
            is_active         INTEGER NOT NULL DEFAULT 1,
            routing           TEXT NOT NULL DEFAULT '{}',
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS intents (
            bot_id            TEXT NOT NULL,
            name              TEXT NOT NULL,
            display_name      TEXT NOT NULL DEFAULT '',
            training_phrases  TEXT NOT NULL DEFAULT '[]',
            responses         TEXT NOT NULL DEFAULT '[]',
            priority          INTEGER NOT NULL DEFAULT 0,
            is_active         INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (bot_id, name),
            FOREIGN KEY (bot_id) REFERENCES bots(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS knowledge_chunks (
            seq               INTEGER PRIMARY KEY AUTOINCREMENT,
            id                TEXT NOT NULL UNIQUE,
            bot_id            TEXT NOT NULL,
            text              TEXT NOT NULL,
            title             TEXT NOT NULL DEFAULT '',
            source            TEXT NOT NULL DEFAULT '',
            chunk_index       INTEGER NOT NULL DEFAULT 0,
            embedding         TEXT,
            status            TEXT NOT NULL DEFAULT 'completed'
                              CHECK (status IN ('pending', 'completed', 'failed')),
            is_active         INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (bot_id) REFERENCES bots(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_bot
            ON knowledge_chunks (bot_id, seq ASC);

        CREATE TABLE IF NOT EXISTS messages (
            seq               INTEGER PRIMARY KEY AUTOINCREMENT,
            bot_id            TEXT NOT NULL,
            session_id        TEXT NOT NULL,
            sender            TEXT NOT NULL CHECK (sender IN ('user', 'bot')),
            text              TEXT NOT NULL,
            timestamp         INTEGER NOT NULL,
            resolution        TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (bot_id, session_id, seq DESC);

        CREATE TABLE IF NOT EXISTS unrecognized_queries (
            bot_id            TEXT NOT NULL,
            text              TEXT NOT NULL,
            occurrences       INTEGER NOT NULL DEFAULT 1,
            first_seen        INTEGER NOT NULL,
            last_seen         INTEGER NOT NULL,
            PRIMARY KEY (bot_id, text)
        );

        CREATE INDEX IF NOT EXISTS idx_unrecognized_occurrences
            ON unrecognized_queries (bot_id, occurrences DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(storage_err("Failed to apply migration v1"))?;

    Ok(())
}
