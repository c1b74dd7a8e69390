//! List command implementation.

use crate::error::CliResult;
use tidemark_store::CheckpointStore;

/// Runs the list command.
pub fn run(store: &dyn CheckpointStore) -> CliResult<()> {
    let streams = store.streams()?;
    if streams.is_empty() {
        tracing::info!("no streams stored");
    }
    for stream in streams {
        println!("{stream}");
    }
    Ok(())
}
