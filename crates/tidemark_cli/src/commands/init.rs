//! Init command implementation.

use crate::error::CliResult;
use crate::value::{self, ValueKind};
use std::sync::Arc;
use tidemark_engine::{StartOptions, SyncStream};
use tidemark_store::CheckpointStore;

/// Runs the init command.
///
/// Refuses to overwrite an existing checkpoint.
pub fn run(store: Arc<dyn CheckpointStore>, stream: &str, start: &str, kind: ValueKind) -> CliResult<()> {
    let value = value::parse(start, kind)?;
    SyncStream::open(store, stream, StartOptions::start(value.clone()))?;
    println!("Created checkpoint for '{stream}' at {value}");
    Ok(())
}
