use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matcher::MatchResult;

/// Database migrations for interception history. Applied in order; the
/// library tracks the applied set through SQLite's user_version pragma.
static MIGRATIONS: &[M] = &[M::up(
    "CREATE TABLE IF NOT EXISTS intercept_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        word TEXT NOT NULL,
        match_type TEXT NOT NULL,
        confidence REAL NOT NULL,
        timestamp INTEGER NOT NULL,
        transcript TEXT NOT NULL
    );",
)];

/// How many fired events are retained by default.
pub const DEFAULT_RETAINED_EVENTS: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterceptEvent {
    pub id: i64,
    pub session_id: String,
    pub word: String,
    pub match_type: String,
    pub confidence: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Raw transcript line that produced the hit.
    pub transcript: String,
}

impl InterceptEvent {
    /// Local wall-clock rendering for display.
    pub fn local_time(&self) -> String {
        use chrono::TimeZone;
        match chrono::Local.timestamp_millis_opt(self.timestamp).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.timestamp.to_string(),
        }
    }
}

/// Append-only store of fired interception events, capped by count.
pub struct InterceptHistory {
    db_path: PathBuf,
    retain: usize,
}

impl InterceptHistory {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        Self::with_retention(db_path, DEFAULT_RETAINED_EVENTS)
    }

    pub fn with_retention(db_path: PathBuf, retain: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!("created history directory {:?}", parent);
            }
        }
        let history = Self {
            db_path,
            retain: retain.max(1),
        };
        history.init_database()?;
        Ok(history)
    }

    fn init_database(&self) -> Result<()> {
        let mut conn = Connection::open(&self.db_path)?;
        let migrations = Migrations::new(MIGRATIONS.to_vec());

        #[cfg(debug_assertions)]
        migrations.validate().expect("invalid migrations");

        let version_before: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        migrations.to_latest(&mut conn)?;
        let version_after: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version_after > version_before {
            info!(
                "history database migrated from version {} to {}",
                version_before, version_after
            );
        } else {
            debug!("history database already at version {}", version_after);
        }
        Ok(())
    }

    fn get_connection(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Records one fired event and prunes anything beyond the retention
    /// cap.
    pub fn record(
        &self,
        session_id: &str,
        hit: &MatchResult,
        confidence: f64,
        timestamp_ms: u64,
        transcript_line: &str,
    ) -> Result<()> {
        let conn = self.get_connection()?;
        Self::insert_with_conn(
            &conn,
            session_id,
            &hit.word,
            hit.match_type.as_str(),
            confidence,
            timestamp_ms as i64,
            transcript_line,
        )?;
        let pruned = Self::cleanup_with_conn(&conn, self.retain)?;
        if pruned > 0 {
            debug!("pruned {} old interception events", pruned);
        }
        Ok(())
    }

    /// Newest first, at most `limit` events.
    pub fn recent(&self, limit: usize) -> Result<Vec<InterceptEvent>> {
        let conn = self.get_connection()?;
        Self::recent_with_conn(&conn, limit)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.get_connection()?;
        Self::count_with_conn(&conn)
    }

    fn insert_with_conn(
        conn: &Connection,
        session_id: &str,
        word: &str,
        match_type: &str,
        confidence: f64,
        timestamp: i64,
        transcript: &str,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO intercept_history (session_id, word, match_type, confidence, timestamp, transcript)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, word, match_type, confidence, timestamp, transcript],
        )?;
        Ok(())
    }

    fn recent_with_conn(conn: &Connection, limit: usize) -> Result<Vec<InterceptEvent>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, word, match_type, confidence, timestamp, transcript
             FROM intercept_history
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(InterceptEvent {
                id: row.get("id")?,
                session_id: row.get("session_id")?,
                word: row.get("word")?,
                match_type: row.get("match_type")?,
                confidence: row.get("confidence")?,
                timestamp: row.get("timestamp")?,
                transcript: row.get("transcript")?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn count_with_conn(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM intercept_history", [], |row| row.get(0))?)
    }

    fn cleanup_with_conn(conn: &Connection, limit: usize) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM intercept_history
             WHERE id NOT IN (
                 SELECT id FROM intercept_history
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1
             )",
            params![limit as i64],
        )?;
        Ok(deleted)
    }
}
