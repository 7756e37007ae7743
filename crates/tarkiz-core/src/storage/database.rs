//! SQLite-based state and history storage.
//!
//! Provides persistent storage for:
//! - Session event history (every lock and unlock)
//! - Key-value store for application state (session machine, blocklist)

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{data_dir, migrations};
use crate::blocklist::Blocklist;
use crate::error::{DatabaseError, Result};
use crate::events::{EventSink, SessionEvent};
use crate::session::SessionMachine;

const SESSION_KEY: &str = "session_machine";
const BLOCKLIST_KEY: &str = "blocklist";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQLite database for app state and session history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/tarkiz/tarkiz.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("tarkiz.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Session history ──────────────────────────────────────────────

    /// Append one event to the history.
    pub fn record_event(&self, event: &SessionEvent) -> Result<i64> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO session_events (kind, at, payload) VALUES (?1, ?2, ?3)",
            params![event.kind(), timestamp(event.at()), payload],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Every event, oldest first.
    pub fn events(&self) -> Result<Vec<SessionEvent>> {
        self.query_events("SELECT payload FROM session_events ORDER BY id", [])
    }

    /// Events with `from <= at < to`, oldest first.
    ///
    /// Timestamps are stored as fixed-width RFC 3339 UTC, so text order is
    /// time order.
    pub fn events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SessionEvent>> {
        self.query_events(
            "SELECT payload FROM session_events WHERE at >= ?1 AND at < ?2 ORDER BY id",
            params![timestamp(from), timestamp(to)],
        )
    }

    fn query_events<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<SessionEvent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        let mut events = Vec::new();
        for payload in rows {
            events.push(serde_json::from_str(&payload?)?);
        }
        Ok(events)
    }

    pub fn clear_events(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM session_events", [])?)
    }

    // ── Key-value state ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv_get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.kv_set(key, &serde_json::to_string(value)?)
    }

    pub fn load_session(&self) -> Result<Option<SessionMachine>> {
        self.load_json(SESSION_KEY)
    }

    pub fn save_session(&self, machine: &SessionMachine) -> Result<()> {
        self.save_json(SESSION_KEY, machine)
    }

    /// Run one machine transition and persist it atomically.
    ///
    /// The events it emits and the updated machine are written in a single
    /// transaction. On any error nothing is stored and `machine` is left as
    /// it was.
    pub fn apply_transition<T>(
        &self,
        machine: &mut SessionMachine,
        transition: impl FnOnce(&mut SessionMachine, &mut Vec<SessionEvent>) -> Result<T>,
    ) -> Result<T> {
        let mut next = machine.clone();
        let mut events = Vec::new();
        let out = transition(&mut next, &mut events)?;

        let tx = self.conn.unchecked_transaction()?;
        for event in &events {
            self.record_event(event)?;
        }
        self.save_session(&next)?;
        tx.commit()?;

        *machine = next;
        Ok(out)
    }

    pub fn load_blocklist(&self) -> Result<Option<Blocklist>> {
        self.load_json(BLOCKLIST_KEY)
    }

    pub fn save_blocklist(&self, blocklist: &Blocklist) -> Result<()> {
        self.save_json(BLOCKLIST_KEY, blocklist)
    }

    /// Drop saved state and history (logout).
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM kv; DELETE FROM session_events;")?;
        tracing::info!("cleared stored state and history");
        Ok(())
    }
}

impl EventSink for Database {
    fn record(&mut self, event: &SessionEvent) -> Result<()> {
        self.record_event(event)?;
        Ok(())
    }
}
