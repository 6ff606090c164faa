//! SQLite schema for both the event log and recording store.
//!
//! Migrations are additive and idempotent: every statement is
//! `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`, so running
//! `init_schema` against an already-current database is a no-op, and a
//! duplicate call from a second process attempting to `auto_migrate`
//! concurrently is harmless.

use rusqlite::Connection;

use crate::error::StoreError;

/// Current schema version, stamped via `PRAGMA user_version`. Bumped only
/// when a future migration needs to distinguish "fresh database" from
/// "database predating this column" — there is exactly one version so far,
/// so every connection simply asserts it matches.
pub const SCHEMA_VERSION: i32 = 1;

/// Create every table and index this crate needs, if not already present,
/// and stamp `PRAGMA user_version`.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            workflow_name TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            caused_by TEXT,
            UNIQUE(session_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_session_position ON events(session_id, position);

        CREATE TABLE IF NOT EXISTS recording_sessions (
            recording_id TEXT PRIMARY KEY,
            request_hash TEXT NOT NULL,
            prompt TEXT NOT NULL,
            provider TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_progress',
            response TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_recording_sessions_hash ON recording_sessions(request_hash);
        CREATE INDEX IF NOT EXISTS idx_recording_sessions_status ON recording_sessions(status);

        CREATE TABLE IF NOT EXISTS recording_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recording_id TEXT NOT NULL,
            event_index INTEGER NOT NULL,
            event_data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(recording_id, event_index),
            FOREIGN KEY (recording_id) REFERENCES recording_sessions(recording_id)
        );
        CREATE INDEX IF NOT EXISTS idx_recording_events_recording ON recording_events(recording_id);
        "#,
    )
    .map_err(|e| StoreError::migration("creating core schema", e))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| StoreError::migration("stamping schema version", e))?;

    Ok(())
}
