//! Sync command implementation.
//!
//! Loads a JSON-lines file as a sorted in-memory source and runs the
//! blocking loop over it, writing each processed record to stdout.

use crate::error::{CliError, CliResult};
use crate::value::{self, ValueKind};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tidemark_engine::{
    chunked, MemorySource, OffsetIterator, PageShape, Processor, StartOptions, SyncConfig,
    SyncError, SyncReport, SyncResult, SyncStream,
};
use tidemark_store::{CheckpointStore, CheckpointValue};

/// Flags of the sync command.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// JSON-lines input file.
    pub input: PathBuf,
    /// Field holding the checkpoint key.
    pub key: String,
    /// Page size.
    pub limit: usize,
    /// Whether keys are unique.
    pub unique: bool,
    /// Cycle cap; 0 is unbounded.
    pub max_iterations: u64,
    /// Stop when the input has nothing new.
    pub until_caught_up: bool,
    /// Initial value for a new stream.
    pub start: Option<String>,
    /// Dry-run value.
    pub test: Option<String>,
    /// How to read key, start and test values.
    pub kind: ValueKind,
    /// Idle pause in seconds.
    pub idle_secs: u64,
    /// Records per output batch.
    pub batch: usize,
}

/// One input line with its parsed key.
#[derive(Debug, Clone)]
struct Record {
    key: CheckpointValue,
    body: Value,
}

/// Runs the sync command.
pub fn run(store: Arc<dyn CheckpointStore>, stream: &str, options: &SyncOptions) -> CliResult<()> {
    let start_options = StartOptions {
        start: options
            .start
            .as_deref()
            .map(|raw| value::parse(raw, options.kind))
            .transpose()?,
        test: options
            .test
            .as_deref()
            .map(|raw| value::parse(raw, options.kind))
            .transpose()?,
    };
    let sync_stream = SyncStream::open(store, stream, start_options)?;
    if !options.unique && !options.until_caught_up {
        tracing::warn!(stream, "non-unique keys without --until-caught-up re-emit the last key group each cycle");
    }

    let records = read_records(&options.input, &options.key, options.kind)?;
    tracing::info!(stream, records = records.len(), input = %options.input.display(), "loaded input");

    let source = MemorySource::new(|r: &Record| r.key.clone()).with_unique_key(options.unique);
    source.extend(records);

    let report = sync_to(sync_stream, source, options, std::io::stdout())?;
    tracing::info!(
        stream,
        cycles = report.cycles,
        records = report.records,
        advances = report.advances,
        stop = ?report.stop,
        "sync finished"
    );
    Ok(())
}

fn sync_to<S, W>(
    stream: SyncStream<S>,
    source: MemorySource<Record>,
    options: &SyncOptions,
    out: W,
) -> CliResult<SyncReport>
where
    S: CheckpointStore + ?Sized,
    W: Write,
{
    let config = SyncConfig::new().with_idle_sleep(Duration::from_secs(options.idle_secs));
    let shape = PageShape::new(|r: Record| Some(r.body), |r: &Record| r.key.clone())
        .with_unique_key(options.unique);

    let batch = options.batch;
    let mut out = out;
    let write_page = move |page: OffsetIterator<Record, Value, CheckpointValue>| -> SyncResult<()> {
        for records in chunked(page, batch) {
            let mut buf = Vec::new();
            for record in records {
                serde_json::to_writer(&mut buf, &record)
                    .map_err(|e| SyncError::Process(e.to_string()))?;
                buf.push(b'\n');
            }
            out.write_all(&buf)
                .and_then(|()| out.flush())
                .map_err(|e| SyncError::Process(e.to_string()))?;
        }
        Ok(())
    };

    let mut processor = Processor::new(stream, config, shape, source, write_page);
    Ok(processor.process(options.limit, options.max_iterations, options.until_caught_up)?)
}

fn read_records(path: &Path, key: &str, kind: ValueKind) -> CliResult<Vec<Record>> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let body: Value = serde_json::from_str(line)?;
        let field = body
            .get(key)
            .ok_or_else(|| CliError::Usage(format!("line {}: missing key field '{key}'", n + 1)))?;
        let key = value::from_json(field, kind)
            .map_err(|e| CliError::Usage(format!("line {}: {e}", n + 1)))?;
        records.push(Record { key, body });
    }
    Ok(records)
}
