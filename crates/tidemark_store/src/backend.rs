//! Checkpoint store trait definition.

use crate::checkpoint::{Checkpoint, StreamName};
use crate::error::StoreResult;

/// Durable home of one checkpoint per stream name.
///
/// # Invariants
///
/// - A checkpoint's `value` and `offset` are loaded and saved as one unit
/// - `save` atomically replaces the stream's single record
/// - `create` never overwrites an existing checkpoint
/// - Backends must be `Send + Sync` for use behind `Arc<dyn CheckpointStore>`
///
/// Errors that a retry may fix report
/// [`is_transient`](crate::StoreError::is_transient); all others are fatal.
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - JSON file per stream
/// - [`super::SqliteStore`] - One row per stream
pub trait CheckpointStore: Send + Sync {
    /// Reads the checkpoint for `stream`.
    ///
    /// Returns `Ok(None)` when no checkpoint has been created yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure or if the
    /// stored record is corrupted.
    fn load(&self, stream: &StreamName) -> StoreResult<Option<Checkpoint>>;

    /// Inserts a new checkpoint, stamping its modification time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the stream already has a checkpoint.
    fn create(&self, checkpoint: &Checkpoint) -> StoreResult<()>;

    /// Atomically replaces the stream's checkpoint and stamps its
    /// modification time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn save(&self, checkpoint: &mut Checkpoint) -> StoreResult<()>;

    /// Deletes the stream's checkpoint, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn delete(&self, stream: &StreamName) -> StoreResult<bool>;

    /// Lists every stream with a checkpoint, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn streams(&self) -> StoreResult<Vec<StreamName>>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<S> {
    fn load(&self, stream: &StreamName) -> StoreResult<Option<Checkpoint>> {
        (**self).load(stream)
    }

    fn create(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        (**self).create(checkpoint)
    }

    fn save(&self, checkpoint: &mut Checkpoint) -> StoreResult<()> {
        (**self).save(checkpoint)
    }

    fn delete(&self, stream: &StreamName) -> StoreResult<bool> {
        (**self).delete(stream)
    }

    fn streams(&self) -> StoreResult<Vec<StreamName>> {
        (**self).streams()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CheckpointStore) {}
    }
}
