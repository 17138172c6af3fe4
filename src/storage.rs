use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::report::{ErrorEvent, ErrorKind, ErrorReporter};
use crate::{SessionId, SessionMode};

/// One row of session history.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    /// Unix epoch milliseconds.
    pub started_at_ms: u64,
    pub mode: SessionMode,
    /// Frames accepted; 0 until the session ends.
    pub frame_count: u64,
}

pub trait SessionHistoryStore: Send + Sync {
    fn record_started(&self, summary: &SessionSummary) -> Result<()>;

    fn record_ended(&self, id: SessionId, frame_count: u64) -> Result<()>;

    /// Most recent sessions first.
    fn load_recent(&self, limit: usize) -> Result<Vec<SessionSummary>>;
}

pub struct SqliteSessionHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionHistoryStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY,
              started_at INTEGER NOT NULL,
              mode TEXT NOT NULL,
              frame_count INTEGER NOT NULL DEFAULT 0,
              ended_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("history connection lock poisoned"))
    }
}

impl SessionHistoryStore for SqliteSessionHistoryStore {
    fn record_started(&self, summary: &SessionSummary) -> Result<()> {
        let started_at = i64::try_from(summary.started_at_ms)
            .map_err(|_| anyhow!("session start time exceeds i64 range"))?;
        self.lock()?.execute(
            r#"
            INSERT OR REPLACE INTO sessions(id, started_at, mode, frame_count)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                summary.id.to_string(),
                started_at,
                summary.mode.as_str(),
                summary.frame_count as i64
            ],
        )?;
        Ok(())
    }

    fn record_ended(&self, id: SessionId, frame_count: u64) -> Result<()> {
        let frame_count = i64::try_from(frame_count)
            .map_err(|_| anyhow!("frame count exceeds i64 range"))?;
        let ended_at = crate::now_ms()? as i64;
        let updated = self.lock()?.execute(
            "UPDATE sessions SET frame_count = ?1, ended_at = ?2 WHERE id = ?3",
            params![frame_count, ended_at, id.to_string()],
        )?;
        if updated == 0 {
            return Err(anyhow!("session {} not found in history", id));
        }
        Ok(())
    }

    fn load_recent(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, started_at, mode, frame_count
            FROM sessions
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let started_at: i64 = row.get(1)?;
            let mode: String = row.get(2)?;
            let frame_count: i64 = row.get(3)?;
            out.push(SessionSummary {
                id: SessionId::parse(&id)?,
                started_at_ms: u64::try_from(started_at)
                    .map_err(|_| anyhow!("corrupt history: negative start time"))?,
                mode: SessionMode::parse(&mode)?,
                frame_count: u64::try_from(frame_count)
                    .map_err(|_| anyhow!("corrupt history: negative frame count"))?,
            });
        }
        Ok(out)
    }
}

impl SqliteSessionHistoryStore {
    /// Whether `id` has been marked ended.
    pub fn is_ended(&self, id: SessionId) -> Result<bool> {
        let ended: Option<Option<i64>> = self
            .lock()?
            .query_row(
                "SELECT ended_at FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(matches!(ended, Some(Some(_))))
    }
}

/// Volatile store for tests and for running without a database.
#[derive(Default)]
pub struct InMemorySessionHistoryStore {
    sessions: Mutex<HashMap<SessionId, SessionSummary>>,
}

impl InMemorySessionHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionSummary>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))
    }
}

impl SessionHistoryStore for InMemorySessionHistoryStore {
    fn record_started(&self, summary: &SessionSummary) -> Result<()> {
        self.lock()?.insert(summary.id, summary.clone());
        Ok(())
    }

    fn record_ended(&self, id: SessionId, frame_count: u64) -> Result<()> {
        let mut sessions = self.lock()?;
        let summary = sessions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("session {} not found in history", id))?;
        summary.frame_count = frame_count;
        Ok(())
    }

    fn load_recent(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut out: Vec<SessionSummary> = self.lock()?.values().cloned().collect();
        out.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        out.truncate(limit);
        Ok(out)
    }
}

/// Read side of session history. Failures are reported and yield an empty list.
pub struct SessionHistory {
    store: Arc<dyn SessionHistoryStore>,
    reporter: Arc<dyn ErrorReporter>,
}

impl SessionHistory {
    pub fn new(store: Arc<dyn SessionHistoryStore>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { store, reporter }
    }

    pub fn load_recent(&self, limit: usize) -> Vec<SessionSummary> {
        match self.store.load_recent(limit) {
            Ok(sessions) => sessions,
            Err(err) => {
                self.reporter.report(ErrorEvent::new(
                    ErrorKind::History,
                    None,
                    format!("loading recent sessions: {:#}", err),
                ));
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(started_at_ms: u64, mode: SessionMode) -> SessionSummary {
        SessionSummary {
            id: SessionId::generate(),
            started_at_ms,
            mode,
            frame_count: 0,
        }
    }

    #[test]
    fn sqlite_store_orders_newest_first_and_records_end() -> Result<()> {
        let store = SqliteSessionHistoryStore::open_in_memory()?;
        let older = summary(1_000, SessionMode::Clinical);
        let newer = summary(2_000, SessionMode::Training);
        store.record_started(&older)?;
        store.record_started(&newer)?;
        store.record_ended(older.id, 42)?;

        let recent = store.load_recent(10)?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, newer.id);
        assert_eq!(recent[0].mode, SessionMode::Training);
        assert_eq!(recent[1].frame_count, 42);
        assert!(store.is_ended(older.id)?);
        assert!(!store.is_ended(newer.id)?);

        assert_eq!(store.load_recent(1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn ending_unknown_session_is_an_error() -> Result<()> {
        let store = SqliteSessionHistoryStore::open_in_memory()?;
        assert!(store.record_ended(SessionId::generate(), 1).is_err());
        let memory = InMemorySessionHistoryStore::new();
        assert!(memory.record_ended(SessionId::generate(), 1).is_err());
        Ok(())
    }

    #[test]
    fn in_memory_store_truncates_to_limit() -> Result<()> {
        let store = InMemorySessionHistoryStore::new();
        for i in 0..5 {
            store.record_started(&summary(i * 10, SessionMode::Developer))?;
        }
        let recent = store.load_recent(3)?;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].started_at_ms, 40);
        Ok(())
    }
}
