use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("row was modified concurrently")]
    Conflict,
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("history encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// SQLite-backed durable store for simulator sessions and the read-only
/// reference tables (instruction sets, example programs).
///
/// A single connection behind a mutex; every operation holds the lock only
/// for its own statements. `save` is guarded by the row's version column,
/// so concurrent writers to one session surface as `Conflict` instead of
/// silently overwriting each other.
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        // Timestamps are stored as fixed-width RFC 3339 UTC text (microsecond
        // precision, Z suffix) so lexicographic order equals chronological
        // order for the retention cutoff comparison.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id      TEXT PRIMARY KEY,
                origin_address  TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                last_touched_at TEXT NOT NULL,
                history         TEXT,
                version         INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

            CREATE TABLE IF NOT EXISTS instruction_sets (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                opcode      TEXT NOT NULL,
                description TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS example_programs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                description TEXT NOT NULL,
                code        TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Allocate a new session with a fresh random id and empty history.
    pub fn create(&self, origin_address: &str) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            origin_address: origin_address.to_string(),
            created_at: now,
            last_touched_at: now,
            history: None,
            version: 0,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (session_id, origin_address, created_at, last_touched_at, history, version)
             VALUES (?1, ?2, ?3, ?4, NULL, 0)",
            params![
                session.id,
                session.origin_address,
                format_ts(session.created_at),
                format_ts(session.last_touched_at),
            ],
        )?;
        Ok(session)
    }

    /// Exact-match lookup by session id.
    pub fn get(&self, id: &str) -> Result<Session, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT session_id, origin_address, created_at, last_touched_at, history, version
             FROM sessions WHERE session_id = ?1",
            params![id],
            map_session_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Persist the mutable fields of an existing session.
    ///
    /// The update is conditional on the version the session was loaded
    /// with: zero affected rows means either the row is gone (`NotFound`,
    /// so a reaped session is never resurrected) or another writer got
    /// there first (`Conflict`, retried by the caller). Identity fields
    /// (`session_id`, `origin_address`, `created_at`) are never written.
    pub fn save(&self, session: &mut Session) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions
             SET last_touched_at = ?1, history = ?2, version = version + 1
             WHERE session_id = ?3 AND version = ?4",
            params![
                format_ts(session.last_touched_at),
                session.history,
                session.id,
                session.version,
            ],
        )?;

        if updated == 1 {
            session.version += 1;
            return Ok(());
        }

        let exists = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![session.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            Err(StoreError::Conflict)
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// All sessions in creation order.
    pub fn list(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, origin_address, created_at, last_touched_at, history, version
             FROM sessions ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], map_session_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete every session whose `created_at` precedes `now - age`.
    /// Returns the number of rows deleted. Idempotent.
    pub fn delete_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let cutoff = format_ts(Utc::now() - age);
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row_idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                row_idx,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(2)?;
    let last_touched_at: String = row.get(3)?;
    Ok(Session {
        id: row.get(0)?,
        origin_address: row.get(1)?,
        created_at: parse_ts(2, &created_at)?,
        last_touched_at: parse_ts(3, &last_touched_at)?,
        history: row.get(4)?,
        version: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(store: &SessionStore, id: &str, days: i64) {
        let conn = store.connection();
        let conn = conn.lock().unwrap();
        let past = format_ts(Utc::now() - Duration::days(days));
        conn.execute(
            "UPDATE sessions SET created_at = ?1, last_touched_at = ?1 WHERE session_id = ?2",
            params![past, id],
        )
        .unwrap();
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::in_memory().unwrap();
        let created = store.create("1.2.3.4").unwrap();

        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.origin_address, "1.2.3.4");
        assert_eq!(fetched.history, None);
        assert!(fetched.created_at <= fetched.last_touched_at);
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let store = SessionStore::in_memory().unwrap();
        assert!(matches!(
            store.get("no-such-session"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let store = SessionStore::in_memory().unwrap();
        let a = store.create("1.2.3.4").unwrap();
        let b = store.create("1.2.3.4").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_save_updates_history_and_touch_time() {
        let store = SessionStore::in_memory().unwrap();
        let mut session = store.create("1.2.3.4").unwrap();

        session.history = Some("[]".to_string());
        session.last_touched_at = Utc::now();
        store.save(&mut session).unwrap();

        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.history.as_deref(), Some("[]"));
        assert_eq!(fetched.version, 1);
    }

    #[test]
    fn test_save_detects_concurrent_write() {
        let store = SessionStore::in_memory().unwrap();
        let session = store.create("1.2.3.4").unwrap();

        // Two writers load the same version
        let mut first = store.get(&session.id).unwrap();
        let mut second = store.get(&session.id).unwrap();

        first.history = Some("[1]".to_string());
        store.save(&mut first).unwrap();

        second.history = Some("[2]".to_string());
        assert!(matches!(store.save(&mut second), Err(StoreError::Conflict)));

        // The first write is intact
        assert_eq!(store.get(&session.id).unwrap().history.as_deref(), Some("[1]"));
    }

    #[test]
    fn test_save_after_delete_is_not_found() {
        let store = SessionStore::in_memory().unwrap();
        let mut session = store.create("1.2.3.4").unwrap();
        backdate(&store, &session.id, 30);

        assert_eq!(store.delete_older_than(Duration::days(10)).unwrap(), 1);

        session.history = Some("[]".to_string());
        assert!(matches!(store.save(&mut session), Err(StoreError::NotFound)));
        // The deleted row must not reappear
        assert!(matches!(store.get(&session.id), Err(StoreError::NotFound)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_older_than_spares_recent_sessions() {
        let store = SessionStore::in_memory().unwrap();
        let old = store.create("1.1.1.1").unwrap();
        let fresh = store.create("2.2.2.2").unwrap();
        backdate(&store, &old.id, 11);

        assert_eq!(store.delete_older_than(Duration::days(10)).unwrap(), 1);
        assert!(matches!(store.get(&old.id), Err(StoreError::NotFound)));
        assert!(store.get(&fresh.id).is_ok());

        // Second pass with no new expirations deletes nothing
        assert_eq!(store.delete_older_than(Duration::days(10)).unwrap(), 0);
    }

    #[test]
    fn test_list_is_in_creation_order() {
        let store = SessionStore::in_memory().unwrap();
        let first = store.create("1.1.1.1").unwrap();
        backdate(&store, &first.id, 1);
        let second = store.create("2.2.2.2").unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }
}
