//! CLI error type.

use thiserror::Error;
use tidemark_engine::SyncError;
use tidemark_store::StoreError;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Bad flag or input value.
    #[error("{0}")]
    Usage(String),

    /// Checkpoint store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sync loop failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Input or output failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input or output.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
