//! The per-session, append-only event log.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_types::{SerializedEvent, SessionId};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// Keyed by [`SessionId`], holds an ordered sequence of
/// [`SerializedEvent`]s with unique per-session positions.
///
/// Implementations MUST NOT silently drop a malformed stored event on
/// read — a deserialization failure is a [`StoreError::Read`], surfaced to
/// the caller, never skipped.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append `event` to `session_id`'s log. Computes
    /// `position = 1 + max(position)` for the session (or 0 if none) and
    /// atomically inserts the row; upserts the `sessions` row on first
    /// insert for that session. Fails on `event.id` collision within the
    /// session.
    async fn append(&self, session_id: &SessionId, event: SerializedEvent) -> Result<(), StoreError>;

    /// All events for `session_id`, ascending by `position`.
    async fn get_events(&self, session_id: &SessionId) -> Result<Vec<SerializedEvent>, StoreError>;

    /// Events for `session_id` at or after `position`, ascending.
    async fn get_events_from(
        &self,
        session_id: &SessionId,
        position: i64,
    ) -> Result<Vec<SerializedEvent>, StoreError>;

    /// All session ids, ordered by `created_at DESC`.
    async fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError>;

    /// Delete a session and all its events. Deletes events first, then the
    /// session row. Idempotent — deleting an unknown session is a no-op.
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), StoreError>;
}

/// SQLite-backed [`EventLog`].
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open (creating if absent) a SQLite database at `path` and ensure the
    /// schema is migrated.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::write("opening database", e))?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database, migrated and ready. Useful for
    /// tests and for `Config::database_url == ":memory:"`.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::write("opening in-memory database", e))?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, session_id: &SessionId, event: SerializedEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("event log connection mutex poisoned");

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM events WHERE session_id = ?1 AND id = ?2",
                params![session_id.as_str(), event.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::read("checking for duplicate event id", e))?;
        if existing.is_some() {
            return Err(StoreError::DuplicateEventId {
                session_id: session_id.clone(),
                event_id: event.id.clone(),
            });
        }

        let next_position: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM events WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::read("computing next position", e))?;

        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, workflow_name, created_at, completed_at, metadata)
             VALUES (?1, NULL, ?2, NULL, NULL)",
            params![session_id.as_str(), event.timestamp_ms_as_iso8601()],
        )
        .map_err(|e| StoreError::write("upserting session row", e))?;

        conn.execute(
            "INSERT INTO events (id, session_id, position, name, payload, timestamp, caused_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.as_str(),
                session_id.as_str(),
                next_position,
                event.name,
                event.payload_json,
                event.timestamp_ms_as_iso8601(),
                event.caused_by.as_ref().map(|id| id.as_str().to_string()),
            ],
        )
        .map_err(|e| StoreError::write("inserting event row", e))?;

        Ok(())
    }

    async fn get_events(&self, session_id: &SessionId) -> Result<Vec<SerializedEvent>, StoreError> {
        self.get_events_from(session_id, 0).await
    }

    async fn get_events_from(
        &self,
        session_id: &SessionId,
        position: i64,
    ) -> Result<Vec<SerializedEvent>, StoreError> {
        let conn = self.conn.lock().expect("event log connection mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, position, name, payload, timestamp, caused_by FROM events
                 WHERE session_id = ?1 AND position >= ?2 ORDER BY position ASC",
            )
            .map_err(|e| StoreError::read("preparing event range query", e))?;
        let rows = stmt
            .query_map(params![session_id.as_str(), position], row_to_event)
            .map_err(|e| StoreError::read("querying event range", e))?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|e| StoreError::read("decoding event row", e))?);
        }
        Ok(events)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let conn = self.conn.lock().expect("event log connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT id FROM sessions ORDER BY created_at DESC")
            .map_err(|e| StoreError::read("preparing session list query", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::read("querying session list", e))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(SessionId::new(row.map_err(|e| StoreError::read("decoding session id", e))?));
        }
        Ok(ids)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("event log connection mutex poisoned");
        conn.execute("DELETE FROM events WHERE session_id = ?1", params![session_id.as_str()])
            .map_err(|e| StoreError::write("deleting session events", e))?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id.as_str()])
            .map_err(|e| StoreError::write("deleting session row", e))?;
        Ok(())
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<SerializedEvent> {
    let id: String = row.get(0)?;
    let position: i64 = row.get(1)?;
    let name: String = row.get(2)?;
    let payload_json: String = row.get(3)?;
    let timestamp: String = row.get(4)?;
    let caused_by: Option<String> = row.get(5)?;
    Ok(SerializedEvent {
        id: id.into(),
        position,
        name,
        payload_json,
        timestamp_ms: iso8601_to_epoch_ms(&timestamp),
        caused_by: caused_by.map(Into::into),
    })
}

fn iso8601_to_epoch_ms(iso: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

trait TimestampExt {
    fn timestamp_ms_as_iso8601(&self) -> String;
}

impl TimestampExt for SerializedEvent {
    fn timestamp_ms_as_iso8601(&self) -> String {
        chrono::DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
            .unwrap_or_else(Utc::now)
            .to_rfc3339()
    }
}

/// In-memory [`EventLog`] for tests and the `Config::database_url == ":memory:"`
/// fast path that skips SQLite entirely.
#[derive(Default)]
pub struct InMemoryEventLog {
    sessions: Mutex<BTreeMap<SessionId, Vec<SerializedEvent>>>,
}

impl InMemoryEventLog {
    /// Construct an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, session_id: &SessionId, event: SerializedEvent) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().expect("event log mutex poisoned");
        let events = sessions.entry(session_id.clone()).or_default();
        if events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::DuplicateEventId {
                session_id: session_id.clone(),
                event_id: event.id.clone(),
            });
        }
        let mut event = event;
        event.position = events.len() as i64;
        events.push(event);
        Ok(())
    }

    async fn get_events(&self, session_id: &SessionId) -> Result<Vec<SerializedEvent>, StoreError> {
        let sessions = self.sessions.lock().expect("event log mutex poisoned");
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn get_events_from(
        &self,
        session_id: &SessionId,
        position: i64,
    ) -> Result<Vec<SerializedEvent>, StoreError> {
        let sessions = self.sessions.lock().expect("event log mutex poisoned");
        Ok(sessions
            .get(session_id)
            .map(|events| events.iter().filter(|e| e.position >= position).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let sessions = self.sessions.lock().expect("event log mutex poisoned");
        Ok(sessions.keys().cloned().collect())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().expect("event log mutex poisoned");
        sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::EventId;

    fn sample_event(id: &str, name: &str) -> SerializedEvent {
        SerializedEvent {
            id: EventId::new(id),
            position: 0,
            name: name.to_string(),
            payload_json: "{}".to_string(),
            timestamp_ms: 0,
            caused_by: None,
        }
    }

    #[tokio::test]
    async fn append_assigns_gap_free_positions() {
        let log = InMemoryEventLog::new();
        let session = SessionId::new("s1");
        log.append(&session, sample_event("e1", "user:input")).await.unwrap();
        log.append(&session, sample_event("e2", "text:delta")).await.unwrap();
        let events = log.get_events(&session).await.unwrap();
        assert_eq!(events[0].position, 0);
        assert_eq!(events[1].position, 1);
    }

    #[tokio::test]
    async fn append_rejects_duplicate_event_id() {
        let log = InMemoryEventLog::new();
        let session = SessionId::new("s1");
        log.append(&session, sample_event("e1", "user:input")).await.unwrap();
        let result = log.append(&session, sample_event("e1", "text:delta")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEventId { .. })));
    }

    #[tokio::test]
    async fn get_events_from_filters_by_position() {
        let log = InMemoryEventLog::new();
        let session = SessionId::new("s1");
        for i in 0..5 {
            log.append(&session, sample_event(&format!("e{i}"), "tick")).await.unwrap();
        }
        let from_two = log.get_events_from(&session, 2).await.unwrap();
        assert_eq!(from_two.len(), 3);
        assert_eq!(from_two[0].position, 2);
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let log = InMemoryEventLog::new();
        let session = SessionId::new("s1");
        log.append(&session, sample_event("e1", "user:input")).await.unwrap();
        log.delete_session(&session).await.unwrap();
        log.delete_session(&session).await.unwrap();
        assert!(log.get_events(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_round_trips_events() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        let session = SessionId::new("s1");
        log.append(&session, sample_event("e1", "user:input")).await.unwrap();
        log.append(&session, sample_event("e2", "text:delta")).await.unwrap();
        let events = log.get_events(&session).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "user:input");
        assert_eq!(events[1].position, 1);
    }

    #[tokio::test]
    async fn sqlite_backend_rejects_duplicate_event_id() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        let session = SessionId::new("s1");
        log.append(&session, sample_event("e1", "user:input")).await.unwrap();
        let result = log.append(&session, sample_event("e1", "text:delta")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEventId { .. })));
    }

    #[tokio::test]
    async fn sqlite_backend_lists_sessions() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        log.append(&SessionId::new("s1"), sample_event("e1", "user:input"))
            .await
            .unwrap();
        log.append(&SessionId::new("s2"), sample_event("e2", "user:input"))
            .await
            .unwrap();
        let sessions = log.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn sqlite_backend_persists_to_an_on_disk_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let path_str = path.to_str().unwrap();

        {
            let log = SqliteEventLog::open(path_str).unwrap();
            log.append(&SessionId::new("s1"), sample_event("e1", "user:input"))
                .await
                .unwrap();
        }

        let reopened = SqliteEventLog::open(path_str).unwrap();
        let events = reopened.get_events(&SessionId::new("s1")).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "user:input");
    }
}
