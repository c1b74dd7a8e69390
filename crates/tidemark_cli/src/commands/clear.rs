//! Clear command implementation.

use crate::error::CliResult;
use tidemark_store::{CheckpointStore, StreamName};

/// Runs the clear command.
pub fn run(store: &dyn CheckpointStore, stream: &str) -> CliResult<()> {
    if store.delete(&StreamName::new(stream))? {
        println!("Deleted checkpoint for '{stream}'");
    } else {
        println!("No checkpoint for '{stream}'");
    }
    Ok(())
}
