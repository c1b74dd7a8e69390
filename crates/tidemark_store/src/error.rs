//! Error types for checkpoint storage.

use std::io;
use thiserror::Error;

/// Result type for checkpoint store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during checkpoint store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A checkpoint blob could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored checkpoint has an unexpected shape.
    #[error("checkpoint corrupted: {0}")]
    Corrupted(String),

    /// A checkpoint already exists for this stream.
    #[error("checkpoint already exists for stream '{0}'")]
    AlreadyExists(String),

    /// The stream name cannot be used by this backend.
    #[error("invalid stream name: {0:?}")]
    InvalidStreamName(String),

    /// The backend configuration is invalid.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Another writer holds the checkpoint lock.
    #[error("checkpoint for stream '{0}' is locked by another writer")]
    Contended(String),
}

impl StoreError {
    /// Returns true if the operation may succeed when retried.
    ///
    /// Lock contention, busy databases and interrupted I/O are transient.
    /// Everything else (corruption, misuse, missing files) is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::Contended(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(StoreError::Sqlite(busy).is_transient());

        let locked = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(StoreError::Sqlite(locked).is_transient());

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow disk");
        assert!(StoreError::Io(timeout).is_transient());
        assert!(StoreError::Contended("orders".into()).is_transient());
    }

    #[test]
    fn fatal_errors() {
        let missing_table = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some("no such table".into()),
        );
        assert!(!StoreError::Sqlite(missing_table).is_transient());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        assert!(!StoreError::Io(denied).is_transient());
        assert!(!StoreError::Corrupted("bad type".into()).is_transient());
        assert!(!StoreError::AlreadyExists("orders".into()).is_transient());
    }

    #[test]
    fn error_display() {
        let err = StoreError::AlreadyExists("orders".into());
        assert_eq!(
            err.to_string(),
            "checkpoint already exists for stream 'orders'"
        );

        let err = StoreError::InvalidStreamName("../etc".into());
        assert!(err.to_string().contains("../etc"));
    }
}
