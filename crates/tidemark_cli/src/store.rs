//! Store selection from global flags.

use crate::error::CliResult;
use clap::ValueEnum;
use std::path::Path;
use std::sync::Arc;
use tidemark_store::{CheckpointStore, FileStore, SqliteConfig, SqliteStore};

/// Database file used by the sqlite store when `--path` is absent.
const DEFAULT_SQLITE_FILE: &str = "tidemark.db";

/// Checkpoint store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// One JSON file per stream in a directory
    File,
    /// One row per stream in a SQLite table
    Sqlite,
}

/// Opens the selected backend.
pub fn open(kind: StoreKind, path: Option<&Path>, table: &str) -> CliResult<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match kind {
        StoreKind::File => {
            let dir = path.unwrap_or_else(|| Path::new("."));
            tracing::debug!(dir = %dir.display(), "opening file store");
            Arc::new(FileStore::open(dir)?)
        }
        StoreKind::Sqlite => {
            let file = path.unwrap_or_else(|| Path::new(DEFAULT_SQLITE_FILE));
            tracing::debug!(file = %file.display(), table, "opening sqlite store");
            Arc::new(SqliteStore::open(&SqliteConfig::new(file).with_table(table))?)
        }
    };
    Ok(store)
}
