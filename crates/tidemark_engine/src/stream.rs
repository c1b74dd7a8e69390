//! Stream bootstrap and checkpoint ownership.

use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tidemark_store::{Checkpoint, CheckpointStore, CheckpointValue, StoreError, StreamName};

/// How a stream obtains its first checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOptions {
    /// Initial value for a stream that has no checkpoint yet.
    pub start: Option<CheckpointValue>,
    /// Run once from this value without reading or writing the store.
    pub test: Option<CheckpointValue>,
}

impl StartOptions {
    /// Resume from the stored checkpoint.
    pub fn resume() -> Self {
        Self::default()
    }

    /// Create the checkpoint at `value`.
    pub fn start(value: impl Into<CheckpointValue>) -> Self {
        Self {
            start: Some(value.into()),
            test: None,
        }
    }

    /// Dry-run from `value`.
    pub fn test(value: impl Into<CheckpointValue>) -> Self {
        Self {
            start: None,
            test: Some(value.into()),
        }
    }
}

/// A named stream bound to its checkpoint store.
///
/// Owns loading and persisting the stream's checkpoint. A dry-run stream
/// keeps an in-memory checkpoint and never touches the store.
pub struct SyncStream<S: ?Sized> {
    store: Arc<S>,
    name: StreamName,
    dry_run: Option<Checkpoint>,
}

impl<S: CheckpointStore + ?Sized> SyncStream<S> {
    /// Opens a stream, creating its checkpoint when `options.start` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when both `start` and `test` are set,
    /// when `start` is given for a stream that already has a checkpoint, or
    /// when a new stream has no `start`.
    pub fn open(
        store: Arc<S>,
        name: impl Into<StreamName>,
        options: StartOptions,
    ) -> SyncResult<Self> {
        let name = name.into();

        match options {
            StartOptions {
                start: Some(_),
                test: Some(_),
            } => Err(SyncError::Config(format!(
                "stream '{name}': start or test, not both"
            ))),

            StartOptions {
                test: Some(value), ..
            } => {
                tracing::info!(stream = %name, value = %value, "test run, checkpoint will not be saved");
                let checkpoint = Checkpoint::new(name.clone(), Some(value), 0);
                Ok(Self {
                    store,
                    name,
                    dry_run: Some(checkpoint),
                })
            }

            StartOptions { start, .. } => {
                let existing = store.load(&name)?;
                match (existing, start) {
                    (Some(_), Some(_)) => Err(SyncError::Config(format!(
                        "stream '{name}': cannot start with existing state"
                    ))),
                    (None, None) => Err(SyncError::Config(format!(
                        "stream '{name}': start required"
                    ))),
                    (None, Some(value)) => {
                        tracing::info!(stream = %name, value = %value, "creating checkpoint");
                        store
                            .create(&Checkpoint::new(name.clone(), Some(value), 0))
                            .map_err(|e| match e {
                                StoreError::AlreadyExists(_) => SyncError::Config(format!(
                                    "stream '{name}': cannot start with existing state"
                                )),
                                other => SyncError::Store(other),
                            })?;
                        Ok(Self {
                            store,
                            name,
                            dry_run: None,
                        })
                    }
                    (Some(checkpoint), None) => {
                        tracing::debug!(
                            stream = %name,
                            offset = checkpoint.offset(),
                            "resuming from stored checkpoint"
                        );
                        Ok(Self {
                            store,
                            name,
                            dry_run: None,
                        })
                    }
                }
            }
        }
    }

    /// The stream's name.
    pub fn name(&self) -> &StreamName {
        &self.name
    }

    /// True if this is a test run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.is_some()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reads the current checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingCheckpoint`] if the record was deleted
    /// since the stream was opened.
    pub fn load(&self) -> SyncResult<Checkpoint> {
        if let Some(checkpoint) = &self.dry_run {
            return Ok(checkpoint.clone());
        }
        load_from(&*self.store, &self.name)
    }

    /// Writes `checkpoint` back, stamping its modification time.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn persist(&self, checkpoint: &mut Checkpoint) -> SyncResult<()> {
        if self.is_dry_run() {
            return Ok(());
        }
        self.store.save(checkpoint)?;
        tracing::debug!(
            stream = %self.name,
            offset = checkpoint.offset(),
            "checkpoint saved"
        );
        Ok(())
    }
}

impl<S: CheckpointStore + ?Sized + 'static> SyncStream<S> {
    /// [`SyncStream::load`] on the blocking thread pool.
    pub(crate) async fn load_async(&self) -> SyncResult<Checkpoint> {
        if let Some(checkpoint) = &self.dry_run {
            return Ok(checkpoint.clone());
        }
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || load_from(&*store, &name))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// [`SyncStream::persist`] on the blocking thread pool.
    pub(crate) async fn persist_async(&self, mut checkpoint: Checkpoint) -> SyncResult<Checkpoint> {
        if self.is_dry_run() {
            return Ok(checkpoint);
        }
        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || {
            store.save(&mut checkpoint)?;
            Ok::<_, SyncError>(checkpoint)
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))??;

        tracing::debug!(
            stream = %self.name,
            offset = saved.offset(),
            "checkpoint saved"
        );
        Ok(saved)
    }
}

fn load_from<S: CheckpointStore + ?Sized>(store: &S, name: &StreamName) -> SyncResult<Checkpoint> {
    store
        .load(name)?
        .ok_or_else(|| SyncError::MissingCheckpoint(name.to_string()))
}
