//! Show command implementation.

use crate::error::{CliError, CliResult};
use serde::Serialize;
use tidemark_store::{Checkpoint, CheckpointRecord, CheckpointStore, StreamName};

/// Checkpoint as printed by `show --format json`.
#[derive(Debug, Serialize)]
pub struct ShowResult {
    /// Stream name.
    pub stream: String,
    /// Persisted checkpoint fields.
    #[serde(flatten)]
    pub record: CheckpointRecord,
    /// Last write, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl From<&Checkpoint> for ShowResult {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            stream: checkpoint.stream().to_string(),
            record: checkpoint.to_record(),
            modified: checkpoint.modified().map(|m| m.to_rfc3339()),
        }
    }
}

/// Runs the show command.
pub fn run(store: &dyn CheckpointStore, stream: &str, format: &str) -> CliResult<()> {
    let checkpoint = store
        .load(&StreamName::new(stream))?
        .ok_or_else(|| CliError::Usage(format!("no checkpoint for '{stream}'")))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&ShowResult::from(&checkpoint))?);
        }
        _ => print_text_output(&checkpoint),
    }
    Ok(())
}

fn print_text_output(checkpoint: &Checkpoint) {
    println!("Stream: {}", checkpoint.stream());
    match checkpoint.value() {
        Some(value) if value.is_timestamp() => println!("Value: {value} (date)"),
        Some(value) => println!("Value: {value}"),
        None => println!("Value: none"),
    }
    println!("Offset: {}", checkpoint.offset());
    if let Some(modified) = checkpoint.modified() {
        println!("Modified: {}", modified.to_rfc3339());
    }
}
