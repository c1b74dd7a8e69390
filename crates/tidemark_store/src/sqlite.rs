//! `SQLite`-backed checkpoint store.
//!
//! One row per stream, keyed by stream name, holding the checkpoint's JSON
//! blob and its last-modified timestamp.

use crate::backend::CheckpointStore;
use crate::checkpoint::{Checkpoint, StreamName};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::Duration;

/// Default checkpoint table.
pub const DEFAULT_TABLE: &str = "sync_manager";

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Table holding one row per stream.
    pub table: String,
    /// How long a statement waits on a locked database before failing with
    /// a busy error.
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    /// Configuration for a database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Configuration for an in-memory database.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: DEFAULT_TABLE.to_string(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// `SQLite`-backed checkpoint storage.
///
/// Every operation runs in its own transaction on a single connection guarded
/// by a mutex, which also serializes concurrent saves from this instance.
/// Busy and locked errors from other connections are reported as transient.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    /// Opens the database described by `config` and creates the checkpoint
    /// table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for an unusable table name,
    /// [`StoreError::Io`] if the parent directory can't be created, or
    /// [`StoreError::Sqlite`] if the database can't be opened.
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        validate_table(&config.table)?;

        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                app TEXT PRIMARY KEY,
                meta TEXT NOT NULL DEFAULT '{{}}',
                modified TEXT
            );",
            config.table
        ))?;

        tracing::debug!(table = %config.table, path = ?config.path, "opened sqlite checkpoint store");

        Ok(Self {
            conn: Mutex::new(conn),
            table: config.table.clone(),
        })
    }

    /// Opens an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the database can't be initialized.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Returns the checkpoint table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn upsert(&self, checkpoint: &Checkpoint, modified: DateTime<Utc>) -> StoreResult<()> {
        let meta = checkpoint.to_json()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (app, meta, modified) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(app) DO UPDATE SET meta = excluded.meta, modified = excluded.modified",
                self.table
            ),
            params![checkpoint.stream().as_str(), meta, format_time(modified)],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn validate_table(table: &str) -> StoreResult<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidConfig(format!(
            "table name {table:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl CheckpointStore for SqliteStore {
    fn load(&self, stream: &StreamName) -> StoreResult<Option<Checkpoint>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT meta, modified FROM {} WHERE app = ?1", self.table),
                [stream.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        match row {
            Some((meta, modified)) => {
                let checkpoint = Checkpoint::from_json(stream.clone(), &meta)?;
                let modified = modified.as_deref().and_then(parse_time);
                Ok(Some(checkpoint.with_modified(modified)))
            }
            None => Ok(None),
        }
    }

    fn create(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let meta = checkpoint.to_json()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            &format!(
                "INSERT INTO {} (app, meta, modified) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(app) DO NOTHING",
                self.table
            ),
            params![
                checkpoint.stream().as_str(),
                meta,
                format_time(Utc::now())
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(checkpoint.stream().to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn save(&self, checkpoint: &mut Checkpoint) -> StoreResult<()> {
        checkpoint.touch();
        let modified = checkpoint.modified().unwrap_or_else(Utc::now);
        self.upsert(checkpoint, modified)
    }

    fn delete(&self, stream: &StreamName) -> StoreResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE app = ?1", self.table),
            [stream.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn streams(&self) -> StoreResult<Vec<StreamName>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT app FROM {} ORDER BY app", self.table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names.into_iter().map(StreamName::new).collect())
    }
}
