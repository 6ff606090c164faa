//! Content-addressed recording store: capture and replay of provider turns.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_types::{AgentRunResult, AgentStreamEvent, RecordingEntry, RecordingHash, RecordingMeta, RecordingStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// Opaque handle to an in-progress recording, returned by
/// [`RecordingStore::start_recording`] and consumed by
/// [`RecordingStore::append_event`]/[`RecordingStore::finalize_recording`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordingId(pub String);

/// Content-addressed cache of provider turns, keyed by [`RecordingHash`].
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Look up a complete, replayable entry for `hash`. Returns `None` on
    /// cache miss, including when the stored `result` fails to decode —
    /// that is treated as a miss, not an error.
    /// Malformed individual stream events are skipped silently; only a
    /// malformed `result` forces a miss.
    async fn load(&self, hash: &RecordingHash) -> Result<Option<RecordingEntry>, StoreError>;

    /// Persist a complete entry, purging any prior entries (either status)
    /// for the same hash.
    async fn save(&self, entry: RecordingEntry) -> Result<(), StoreError>;

    /// Begin incremental capture of a live turn. Purges any prior
    /// `in_progress` entry for the same hash and returns a handle for
    /// [`RecordingStore::append_event`].
    async fn start_recording(
        &self,
        hash: &RecordingHash,
        prompt: &str,
        provider: &str,
    ) -> Result<RecordingId, StoreError>;

    /// Append the next stream event to an in-progress recording.
    async fn append_event(&self, recording_id: &RecordingId, event: AgentStreamEvent) -> Result<(), StoreError>;

    /// Mark a recording complete with its terminal result.
    async fn finalize_recording(&self, recording_id: &RecordingId, result: AgentRunResult) -> Result<(), StoreError>;

    /// Delete all entries (and captured events) for `hash`.
    async fn delete(&self, hash: &RecordingHash) -> Result<(), StoreError>;

    /// Summaries of every `complete` entry, ordered by `completed_at DESC`.
    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError>;
}

/// SQLite-backed [`RecordingStore`].
pub struct SqliteRecordingStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordingStore {
    /// Open (creating if absent) a SQLite database at `path`, migrated.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::write("opening database", e))?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database, migrated and ready.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::write("opening in-memory database", e))?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn purge(conn: &Connection, hash: &str) -> Result<(), StoreError> {
        conn.execute(
            "DELETE FROM recording_events WHERE recording_id IN
             (SELECT recording_id FROM recording_sessions WHERE request_hash = ?1)",
            params![hash],
        )
        .map_err(|e| StoreError::write("purging prior recording events", e))?;
        conn.execute("DELETE FROM recording_sessions WHERE request_hash = ?1", params![hash])
            .map_err(|e| StoreError::write("purging prior recording sessions", e))?;
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for SqliteRecordingStore {
    async fn load(&self, hash: &RecordingHash) -> Result<Option<RecordingEntry>, StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");

        let row: Option<(String, String, String, String, Option<String>, String, Option<String>)> = conn
            .query_row(
                "SELECT recording_id, prompt, provider, status, response, created_at, completed_at
                 FROM recording_sessions WHERE request_hash = ?1 AND status = 'complete'",
                params![hash.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::read("loading recording session", e))?;

        let Some((recording_id, prompt, provider, _status, response, created_at, completed_at)) = row else {
            return Ok(None);
        };

        let Some(response_json) = response else {
            return Ok(None);
        };
        let result: AgentRunResult = match serde_json::from_str(&response_json) {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        let mut stmt = conn
            .prepare(
                "SELECT event_data FROM recording_events WHERE recording_id = ?1 ORDER BY event_index ASC",
            )
            .map_err(|e| StoreError::read("preparing recording events query", e))?;
        let rows = stmt
            .query_map(params![recording_id], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::read("querying recording events", e))?;
        let mut stream_data = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| StoreError::read("decoding recording event row", e))?;
            if let Ok(event) = serde_json::from_str::<AgentStreamEvent>(&raw) {
                stream_data.push(event);
            }
            // Malformed individual stream events are skipped, per contract.
        }

        Ok(Some(RecordingEntry {
            hash: hash.clone(),
            prompt,
            provider,
            stream_data,
            result: Some(result),
            status: RecordingStatus::Complete,
            created_at: parse_iso(&created_at),
            completed_at: completed_at.as_deref().map(parse_iso),
        }))
    }

    async fn save(&self, entry: RecordingEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        Self::purge(&conn, entry.hash.as_str())?;

        let recording_id = entry.hash.as_str().to_string();
        let response_json = entry
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::write("serializing recording result", e))?;

        conn.execute(
            "INSERT INTO recording_sessions
             (recording_id, request_hash, prompt, provider, status, response, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, 'complete', ?5, ?6, ?7)",
            params![
                recording_id,
                entry.hash.as_str(),
                entry.prompt,
                entry.provider,
                response_json,
                entry.created_at.to_rfc3339(),
                entry.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| StoreError::write("inserting recording session", e))?;

        for (index, event) in entry.stream_data.iter().enumerate() {
            let data = serde_json::to_string(event).map_err(|e| StoreError::write("serializing stream event", e))?;
            conn.execute(
                "INSERT INTO recording_events (recording_id, event_index, event_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recording_id, index as i64, data, Utc::now().to_rfc3339()],
            )
            .map_err(|e| StoreError::write("inserting recording event", e))?;
        }

        Ok(())
    }

    async fn start_recording(
        &self,
        hash: &RecordingHash,
        prompt: &str,
        provider: &str,
    ) -> Result<RecordingId, StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        conn.execute(
            "DELETE FROM recording_events WHERE recording_id IN
             (SELECT recording_id FROM recording_sessions WHERE request_hash = ?1 AND status = 'in_progress')",
            params![hash.as_str()],
        )
        .map_err(|e| StoreError::write("purging stale in-progress events", e))?;
        conn.execute(
            "DELETE FROM recording_sessions WHERE request_hash = ?1 AND status = 'in_progress'",
            params![hash.as_str()],
        )
        .map_err(|e| StoreError::write("purging stale in-progress session", e))?;

        let recording_id = format!("{}-{}", hash.as_str(), uuid::Uuid::new_v4());
        conn.execute(
            "INSERT INTO recording_sessions
             (recording_id, request_hash, prompt, provider, status, response, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, 'in_progress', NULL, ?5, NULL)",
            params![recording_id, hash.as_str(), prompt, provider, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::write("inserting in-progress recording session", e))?;

        Ok(RecordingId(recording_id))
    }

    async fn append_event(&self, recording_id: &RecordingId, event: AgentStreamEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        let next_index: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(event_index) + 1, 0) FROM recording_events WHERE recording_id = ?1",
                params![recording_id.0],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::read("computing next event index", e))?;
        let data = serde_json::to_string(&event).map_err(|e| StoreError::write("serializing stream event", e))?;
        conn.execute(
            "INSERT INTO recording_events (recording_id, event_index, event_data, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![recording_id.0, next_index, data, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::write("appending recording event", e))?;
        Ok(())
    }

    async fn finalize_recording(&self, recording_id: &RecordingId, result: AgentRunResult) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        let response_json = serde_json::to_string(&result).map_err(|e| StoreError::write("serializing result", e))?;
        conn.execute(
            "UPDATE recording_sessions SET status = 'complete', response = ?1, completed_at = ?2
             WHERE recording_id = ?3",
            params![response_json, Utc::now().to_rfc3339(), recording_id.0],
        )
        .map_err(|e| StoreError::write("finalizing recording session", e))?;
        Ok(())
    }

    async fn delete(&self, hash: &RecordingHash) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        Self::purge(&conn, hash.as_str())
    }

    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError> {
        let conn = self.conn.lock().expect("recording store connection mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT request_hash, prompt, provider, completed_at FROM recording_sessions
                 WHERE status = 'complete' ORDER BY completed_at DESC",
            )
            .map_err(|e| StoreError::read("preparing recording list query", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| StoreError::read("querying recording list", e))?;
        let mut metas = Vec::new();
        for row in rows {
            let (hash, prompt, provider, completed_at) = row.map_err(|e| StoreError::read("decoding recording meta row", e))?;
            metas.push(RecordingMeta {
                hash: hash.into(),
                prompt,
                provider,
                recorded_at: completed_at.as_deref().map(parse_iso).unwrap_or_else(Utc::now),
            });
        }
        Ok(metas)
    }
}

fn parse_iso(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// In-memory [`RecordingStore`] for tests and playback-only configurations
/// that pre-load recordings without touching SQLite.
#[derive(Default)]
pub struct InMemoryRecordingStore {
    entries: Mutex<BTreeMap<String, RecordingEntry>>,
    in_progress: Mutex<BTreeMap<String, RecordingEntry>>,
}

impl InMemoryRecordingStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a complete entry, as test fixtures and `playback`-mode
    /// startup do.
    pub fn seed(&self, entry: RecordingEntry) {
        self.entries.lock().expect("recording store mutex poisoned").insert(entry.hash.as_str().to_string(), entry);
    }
}

#[async_trait]
impl RecordingStore for InMemoryRecordingStore {
    async fn load(&self, hash: &RecordingHash) -> Result<Option<RecordingEntry>, StoreError> {
        let entries = self.entries.lock().expect("recording store mutex poisoned");
        Ok(entries
            .get(hash.as_str())
            .filter(|entry| entry.is_replayable())
            .cloned())
    }

    async fn save(&self, entry: RecordingEntry) -> Result<(), StoreError> {
        let key = entry.hash.as_str().to_string();
        self.in_progress.lock().expect("recording store mutex poisoned").remove(&key);
        self.entries.lock().expect("recording store mutex poisoned").insert(key, entry);
        Ok(())
    }

    async fn start_recording(
        &self,
        hash: &RecordingHash,
        prompt: &str,
        provider: &str,
    ) -> Result<RecordingId, StoreError> {
        let recording_id = format!("{}-{}", hash.as_str(), uuid::Uuid::new_v4());
        let entry = RecordingEntry::start(hash.clone(), prompt, provider);
        self.in_progress
            .lock()
            .expect("recording store mutex poisoned")
            .insert(recording_id.clone(), entry);
        Ok(RecordingId(recording_id))
    }

    async fn append_event(&self, recording_id: &RecordingId, event: AgentStreamEvent) -> Result<(), StoreError> {
        let mut in_progress = self.in_progress.lock().expect("recording store mutex poisoned");
        if let Some(entry) = in_progress.get_mut(&recording_id.0) {
            entry.push_event(event);
        }
        Ok(())
    }

    async fn finalize_recording(&self, recording_id: &RecordingId, result: AgentRunResult) -> Result<(), StoreError> {
        let mut in_progress = self.in_progress.lock().expect("recording store mutex poisoned");
        if let Some(mut entry) = in_progress.remove(&recording_id.0) {
            entry.finalize(result);
            let key = entry.hash.as_str().to_string();
            self.entries.lock().expect("recording store mutex poisoned").insert(key, entry);
        }
        Ok(())
    }

    async fn delete(&self, hash: &RecordingHash) -> Result<(), StoreError> {
        self.entries.lock().expect("recording store mutex poisoned").remove(hash.as_str());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RecordingMeta>, StoreError> {
        let entries = self.entries.lock().expect("recording store mutex poisoned");
        let mut metas: Vec<RecordingMeta> = entries
            .values()
            .filter(|e| e.is_replayable())
            .map(|e| RecordingMeta {
                hash: e.hash.clone(),
                prompt: e.prompt.clone(),
                provider: e.provider.clone(),
                recorded_at: e.completed_at.unwrap_or(e.created_at),
            })
            .collect();
        metas.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{AgentStreamEventKind, StopReason};

    fn sample_result() -> AgentRunResult {
        AgentRunResult {
            text: Some("hi".into()),
            structured_output: None,
            stop_reason: Some(StopReason::EndTurn),
            usage: Default::default(),
        }
    }

    #[tokio::test]
    async fn in_memory_round_trips_a_complete_recording() {
        let store = InMemoryRecordingStore::new();
        let hash = RecordingHash::new("h1");
        let id = store.start_recording(&hash, "hello", "anthropic").await.unwrap();
        store
            .append_event(&id, AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("hi".into())))
            .await
            .unwrap();
        store.finalize_recording(&id, sample_result()).await.unwrap();

        let loaded = store.load(&hash).await.unwrap().expect("should be replayable");
        assert_eq!(loaded.stream_data.len(), 1);
        assert_eq!(loaded.result.unwrap().text, Some("hi".into()));
    }

    #[tokio::test]
    async fn in_memory_miss_for_unknown_hash() {
        let store = InMemoryRecordingStore::new();
        assert!(store.load(&RecordingHash::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_round_trips_a_saved_recording() {
        let store = SqliteRecordingStore::open_in_memory().unwrap();
        let hash = RecordingHash::new("h1");
        let mut entry = RecordingEntry::start(hash.clone(), "hello", "anthropic");
        entry.push_event(AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("hi".into())));
        entry.finalize(sample_result());
        store.save(entry).await.unwrap();

        let loaded = store.load(&hash).await.unwrap().expect("should be replayable");
        assert_eq!(loaded.stream_data.len(), 1);
        assert_eq!(loaded.result.unwrap().text, Some("hi".into()));
    }

    #[tokio::test]
    async fn sqlite_save_purges_prior_entries_for_same_hash() {
        let store = SqliteRecordingStore::open_in_memory().unwrap();
        let hash = RecordingHash::new("h1");

        let mut first = RecordingEntry::start(hash.clone(), "first", "anthropic");
        first.finalize(sample_result());
        store.save(first).await.unwrap();

        let mut second = RecordingEntry::start(hash.clone(), "second", "anthropic");
        second.finalize(sample_result());
        store.save(second).await.unwrap();

        let loaded = store.load(&hash).await.unwrap().unwrap();
        assert_eq!(loaded.prompt, "second");
    }

    #[tokio::test]
    async fn sqlite_incremental_capture_then_finalize() {
        let store = SqliteRecordingStore::open_in_memory().unwrap();
        let hash = RecordingHash::new("h1");
        let id = store.start_recording(&hash, "hello", "anthropic").await.unwrap();
        store
            .append_event(&id, AgentStreamEvent::new(0, AgentStreamEventKind::TextDelta("a".into())))
            .await
            .unwrap();
        store
            .append_event(&id, AgentStreamEvent::new(1, AgentStreamEventKind::TextDelta("b".into())))
            .await
            .unwrap();

        assert!(store.load(&hash).await.unwrap().is_none(), "in-progress entries are not replayable");

        store.finalize_recording(&id, sample_result()).await.unwrap();
        let loaded = store.load(&hash).await.unwrap().unwrap();
        assert_eq!(loaded.stream_data.len(), 2);
    }
}
