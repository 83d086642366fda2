//! SQLite-backed count index.
//!
//! Persists the per-type counters and ordered sets so counts survive a
//! restart. The schema mirrors a sorted-set store:
//!
//! ```text
//! event_counters(event_name PK, value, cardinality)
//! events_by_type(event_name, member, score)   PK (event_name, member)
//!                                             INDEX (event_name, score)
//! ```
//!
//! `value` is the id counter; `cardinality` is kept alongside it so totals
//! are a single-row lookup. Range counts use the `(event_name, score)` index.

use super::count_index::{CountIndex, ScoreRange};
use eventlog_core::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::info;

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// [`CountIndex`] stored in a SQLite database.
pub struct SqliteCountIndex {
    conn: Mutex<Connection>,
}

impl SqliteCountIndex {
    /// Open or create the index database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening count index at {}", path.display());

        let conn = Connection::open(path).map_err(index_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(index_err)?;

        Self::with_connection(conn)
    }

    /// Create a throwaway in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(index_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn).map_err(index_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CountIndex for SqliteCountIndex {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn record_arrival(&self, event_name: &str, score: i64) -> Result<u64> {
        let mut conn = self.conn.lock();

        // The counter bump commits on its own: a failed insert below leaves a
        // gap in the ids and the event uncounted, never a reused id.
        let id: i64 = conn
            .query_row(
                "INSERT INTO event_counters (event_name, value, cardinality) VALUES (?1, 1, 0)
                 ON CONFLICT(event_name) DO UPDATE SET value = value + 1
                 RETURNING value",
                [event_name],
                |row| row.get(0),
            )
            .map_err(index_err)?;

        let tx = conn.transaction().map_err(index_err)?;
        tx.execute(
            "INSERT INTO events_by_type (event_name, member, score) VALUES (?1, ?2, ?3)",
            params![event_name, id, score],
        )
        .map_err(index_err)?;
        tx.execute(
            "UPDATE event_counters SET cardinality = cardinality + 1 WHERE event_name = ?1",
            [event_name],
        )
        .map_err(index_err)?;
        tx.commit().map_err(index_err)?;

        Ok(id as u64)
    }

    fn count_total(&self, event_name: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: Option<i64> = conn
            .query_row(
                "SELECT cardinality FROM event_counters WHERE event_name = ?1",
                [event_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(index_err)?;
        Ok(count.unwrap_or(0) as u64)
    }

    fn count_range(&self, event_name: &str, range: ScoreRange) -> Result<u64> {
        let (lo, hi) = range.bounds();
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events_by_type
                 WHERE event_name = ?1 AND score BETWEEN ?2 AND ?3",
                params![event_name, lo, hi],
                |row| row.get(0),
            )
            .map_err(index_err)?;
        Ok(count as u64)
    }
}

fn index_err(e: rusqlite::Error) -> Error {
    Error::CountIndex(e.to_string())
}

/// Create tables if needed and run pending migrations.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Per-type id counter and set cardinality
        CREATE TABLE IF NOT EXISTS event_counters (
            event_name TEXT PRIMARY KEY,
            value INTEGER NOT NULL,
            cardinality INTEGER NOT NULL DEFAULT 0
        );

        -- Ordered set members: one row per recorded arrival
        CREATE TABLE IF NOT EXISTS events_by_type (
            event_name TEXT NOT NULL,
            member INTEGER NOT NULL,
            score INTEGER NOT NULL,
            PRIMARY KEY (event_name, member)
        );

        CREATE INDEX IF NOT EXISTS idx_events_by_type_score
            ON events_by_type(event_name, score);
        "#,
    )
}
