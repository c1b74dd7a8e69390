//! # tidemark store
//!
//! Checkpoint model and the storage contract for tidemark sync streams.
//!
//! A checkpoint records how far one named stream has progressed: a progress
//! value plus a secondary page offset. The sync engine loads it before every
//! fetch and saves it after every page it has fully processed.
//!
//! ## Design Principles
//!
//! - One checkpoint per stream name
//! - `value` and `offset` are always read and written together
//! - `save` is an atomic replace of the stream's record
//! - `create` never overwrites existing progress
//! - Backend failures are split into transient (retry) and fatal
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and dry runs
//! - [`FileStore`] - One JSON file per stream
//! - [`SqliteStore`] - One row per stream in a `SQLite` table
//!
//! ## Example
//!
//! ```rust
//! use tidemark_store::{Checkpoint, CheckpointStore, InMemoryStore, StreamName};
//!
//! let store = InMemoryStore::new();
//! let stream = StreamName::new("orders");
//! store.create(&Checkpoint::new(stream.clone(), Some(10.into()), 0)).unwrap();
//!
//! let loaded = store.load(&stream).unwrap().unwrap();
//! assert_eq!(loaded.value(), Some(&10.into()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod checkpoint;
mod error;
mod file;
mod memory;
mod sqlite;

pub use backend::CheckpointStore;
pub use checkpoint::{Checkpoint, CheckpointRecord, CheckpointValue, StreamName, DATE_TYPE_TAG};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use sqlite::{SqliteConfig, SqliteStore, DEFAULT_TABLE};
