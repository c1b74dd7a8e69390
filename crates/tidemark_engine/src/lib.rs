//! # tidemark engine
//!
//! Incremental, checkpointed sync loop for paged sources.
//!
//! This crate provides:
//! - Offset-tracking iterator over fetched pages
//! - Checkpoint-advance decision logic
//! - Blocking and cooperative (tokio) sync loops
//! - Retry with exponential backoff
//! - Periodic background sync task
//!
//! ## Cycle
//!
//! One cycle of a sync loop:
//! 1. Load the stream's checkpoint and fetch the page after it
//! 2. Hand the page to the processing function as an [`OffsetIterator`]
//! 3. Decide how far the checkpoint may advance
//! 4. Persist the checkpoint, sleep, or stop
//!
//! ## Key Invariants
//!
//! - The checkpoint is committed after its page is processed and before the
//!   next fetch (at-least-once delivery; processing must be idempotent)
//! - A full page of non-unique keys never checkpoints on its final key
//! - A unique-key stream that fails to advance is a fatal error
//! - Only transient store and source errors are retried
//! - One loop per stream at a time; the caller enforces this
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tidemark_engine::{
//!     MemorySource, OffsetIterator, PageShape, Processor, StartOptions, StopReason,
//!     SyncConfig, SyncStream,
//! };
//! use tidemark_store::{CheckpointValue, InMemoryStore};
//!
//! let source = MemorySource::new(|id: &i64| CheckpointValue::Integer(*id)).with_unique_key(true);
//! source.extend(1..=10);
//!
//! let store = Arc::new(InMemoryStore::new());
//! let stream = SyncStream::open(store, "ids", StartOptions::start(0)).unwrap();
//! let mut processor = Processor::new(
//!     stream,
//!     SyncConfig::default(),
//!     PageShape::passthrough(|id: &i64| *id).with_unique_key(true),
//!     source,
//!     |page: OffsetIterator<i64, i64, i64>| {
//!         page.for_each(drop);
//!         Ok(())
//!     },
//! );
//!
//! let report = processor.process_until_complete(4).unwrap();
//! assert_eq!(report.stop, StopReason::CaughtUp);
//! assert_eq!(report.records, 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod async_processor;
mod batch;
mod config;
mod cycle;
mod error;
mod iterator;
mod periodic;
mod processor;
mod retry;
mod source;
mod stream;

pub use async_processor::{AsyncProcessor, CancelToken};
pub use batch::{chunked, Chunked};
pub use config::{RetryConfig, SyncConfig};
pub use cycle::{update_offset, Advance, LoopPolicy, Step, StopReason, SyncReport};
pub use error::{SyncError, SyncResult};
pub use iterator::{KeyExtractor, OffsetIterator, PageShape, PageSummary, PageTracker, RowMapper};
pub use periodic::{spawn_periodic, PeriodicConfig, PeriodicHandle};
pub use processor::Processor;
pub use retry::{retry_async, retry_blocking, Sleeper, ThreadSleeper};
pub use source::{MemorySource, PageRequest, PageSource};
pub use stream::{StartOptions, SyncStream};
