//! Background task that re-runs a stream on a fixed interval.

use crate::async_processor::{sleep_cancellable, AsyncProcessor, CancelToken};
use crate::cycle::StopReason;
use crate::error::{SyncError, SyncResult};
use crate::iterator::OffsetIterator;
use crate::source::PageRequest;
use std::future::Future;
use std::time::Duration;
use tidemark_store::{CheckpointStore, CheckpointValue};
use tokio::task::JoinHandle;

/// Schedule of a periodic sync task.
#[derive(Debug, Clone)]
pub struct PeriodicConfig {
    /// Wait before each sync.
    pub interval: Duration,
    /// Page size of each sync.
    pub limit: usize,
    /// Cycle cap of each sync; 0 is unbounded.
    pub max_iterations: u64,
}

impl PeriodicConfig {
    /// Creates a schedule with no cycle cap.
    pub fn new(interval: Duration, limit: usize) -> Self {
        Self {
            interval,
            limit,
            max_iterations: 0,
        }
    }

    /// Caps the cycles of each sync.
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Handle to a task started by [`spawn_periodic`].
pub struct PeriodicHandle {
    cancel: CancelToken,
    task: JoinHandle<SyncResult<u64>>,
}

impl PeriodicHandle {
    /// Asks the task to stop; it finishes within one sleep slice or at the
    /// end of the cycle in flight.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the task and returns how many syncs it completed.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the task, or [`SyncError::Task`] if it
    /// panicked.
    pub async fn join(self) -> SyncResult<u64> {
        self.task
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }
}

/// Spawns a task that waits `config.interval`, then runs the processor until
/// caught up, forever.
///
/// The wait is sliced by the processor's sleep slice and stops as soon as
/// the processor's cancel token is set. An error ends the task.
pub fn spawn_periodic<S, Q, QF, P, PF, R, O, K>(
    mut processor: AsyncProcessor<S, Q, P, R, O, K>,
    config: PeriodicConfig,
) -> PeriodicHandle
where
    S: CheckpointStore + ?Sized + 'static,
    Q: FnMut(PageRequest) -> QF + Send + 'static,
    QF: Future<Output = SyncResult<Option<Vec<R>>>> + Send + 'static,
    P: FnMut(OffsetIterator<R, O, K>) -> PF + Send + 'static,
    PF: Future<Output = SyncResult<()>> + Send + 'static,
    R: Send + 'static,
    O: Send + 'static,
    K: PartialEq + Clone + Into<CheckpointValue> + Send + 'static,
{
    let cancel = processor.cancel_token();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let slice = processor.config().sleep_slice;
        let mut runs = 0u64;

        while sleep_cancellable(config.interval, slice, &token).await {
            let report = processor
                .process(config.limit, config.max_iterations, true)
                .await?;
            runs += 1;
            tracing::debug!(
                stream = %processor.stream().name(),
                runs,
                records = report.records,
                "periodic sync finished"
            );
            if report.stop == StopReason::Cancelled {
                break;
            }
        }

        tracing::info!(stream = %processor.stream().name(), runs, "periodic sync stopped");
        Ok::<_, SyncError>(runs)
    });

    PeriodicHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::iterator::PageShape;
    use crate::source::MemorySource;
    use crate::stream::{StartOptions, SyncStream};
    use std::sync::Arc;
    use tidemark_store::InMemoryStore;

    #[tokio::test(start_paused = true)]
    async fn picks_up_new_records_each_interval() {
        let store = Arc::new(InMemoryStore::new());
        let stream = SyncStream::open(Arc::clone(&store), "ids", StartOptions::start(0)).unwrap();
        let source = MemorySource::new(|k: &i64| CheckpointValue::Integer(*k)).with_unique_key(true);
        source.extend([1, 2]);
        let reader = source.clone();

        let processor = AsyncProcessor::new(
            stream,
            SyncConfig::new(),
            PageShape::passthrough(|k: &i64| *k).with_unique_key(true),
            move |req: PageRequest| {
                let page = reader.page(&req);
                async move { Ok::<_, SyncError>(Some(page)) }
            },
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                async { Ok::<(), SyncError>(()) }
            },
        );

        let handle = spawn_periodic(processor, PeriodicConfig::new(Duration::from_secs(10), 10));

        tokio::time::sleep(Duration::from_secs(15)).await;
        source.extend([3]);
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.stop();

        assert_eq!(handle.join().await.unwrap(), 2);
        let checkpoint = store.load(&"ids".into()).unwrap().unwrap();
        assert_eq!(checkpoint.value(), Some(&CheckpointValue::Integer(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_end_the_task() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let processor = AsyncProcessor::new(
            stream,
            SyncConfig::new(),
            PageShape::passthrough(|k: &i64| *k),
            |_: PageRequest| async { Err::<Option<Vec<i64>>, _>(SyncError::source_fatal("gone")) },
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                async { Ok::<(), SyncError>(()) }
            },
        );

        let handle = spawn_periodic(processor, PeriodicConfig::new(Duration::from_secs(1), 10));
        assert!(matches!(handle.join().await, Err(SyncError::Source { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_wait_ends_without_syncing() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let processor = AsyncProcessor::new(
            stream,
            SyncConfig::new(),
            PageShape::passthrough(|k: &i64| *k),
            |_: PageRequest| async { Ok::<_, SyncError>(Some(Vec::<i64>::new())) },
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                async { Ok::<(), SyncError>(()) }
            },
        );

        let handle = spawn_periodic(processor, PeriodicConfig::new(Duration::from_secs(60), 10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.stop();

        assert_eq!(handle.join().await.unwrap(), 0);
    }
}
