//! In-memory checkpoint store for testing.

use crate::backend::CheckpointStore;
use crate::checkpoint::{Checkpoint, StreamName};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory checkpoint store.
///
/// Suitable for unit tests, integration tests and dry runs that must not
/// touch durable state.
///
/// # Example
///
/// ```rust
/// use tidemark_store::{Checkpoint, CheckpointStore, InMemoryStore, StreamName};
///
/// let store = InMemoryStore::new();
/// let mut cp = Checkpoint::new(StreamName::new("events"), None, 0);
/// store.save(&mut cp).unwrap();
/// assert!(cp.modified().is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    checkpoints: RwLock<BTreeMap<StreamName, Checkpoint>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    /// Returns true if no checkpoint is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

impl CheckpointStore for InMemoryStore {
    fn load(&self, stream: &StreamName) -> StoreResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(stream).cloned())
    }

    fn create(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let mut checkpoints = self.checkpoints.write();
        if checkpoints.contains_key(checkpoint.stream()) {
            return Err(StoreError::AlreadyExists(checkpoint.stream().to_string()));
        }
        let mut stored = checkpoint.clone();
        stored.touch();
        checkpoints.insert(stored.stream().clone(), stored);
        Ok(())
    }

    fn save(&self, checkpoint: &mut Checkpoint) -> StoreResult<()> {
        checkpoint.touch();
        self.checkpoints
            .write()
            .insert(checkpoint.stream().clone(), checkpoint.clone());
        Ok(())
    }

    fn delete(&self, stream: &StreamName) -> StoreResult<bool> {
        Ok(self.checkpoints.write().remove(stream).is_some())
    }

    fn streams(&self) -> StoreResult<Vec<StreamName>> {
        Ok(self.checkpoints.read().keys().cloned().collect())
    }
}
