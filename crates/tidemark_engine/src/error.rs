//! Error types for the sync engine.

use thiserror::Error;
use tidemark_store::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while running a sync stream.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Checkpoint store failure.
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    /// The source query failed.
    #[error("source error: {message}")]
    Source {
        /// Error message.
        message: String,
        /// Whether the query can be retried.
        retryable: bool,
    },

    /// The processing function failed.
    #[error("processing error: {0}")]
    Process(String),

    /// The stream was set up with conflicting or missing options.
    #[error("configuration error: {0}")]
    Config(String),

    /// A stream declared unique did not advance its checkpoint.
    #[error(
        "aborting sync of stream '{stream}': checkpoint did not advance past {value}, \
         perhaps the key is not unique?"
    )]
    KeyNotUnique {
        /// Stream name.
        stream: String,
        /// Checkpoint value that failed to move.
        value: String,
    },

    /// The stream's checkpoint disappeared from the store mid-run.
    #[error("no checkpoint stored for stream '{0}'")]
    MissingCheckpoint(String),

    /// Transient errors persisted through every retry attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: Box<SyncError>,
    },

    /// A background task failed to run to completion.
    #[error("task error: {0}")]
    Task(String),
}

impl SyncError {
    /// Creates a retryable source error.
    pub fn source_retryable(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable source error.
    pub fn source_fatal(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error belongs to the transient category and the
    /// failed step may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_transient(),
            SyncError::Source { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
