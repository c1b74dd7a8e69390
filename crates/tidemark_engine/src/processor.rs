//! Blocking sync loop.

use crate::config::SyncConfig;
use crate::cycle::{LoopPolicy, Step, StopReason, SyncReport};
use crate::error::{SyncError, SyncResult};
use crate::iterator::{OffsetIterator, PageShape};
use crate::retry::{retry_blocking, Sleeper, ThreadSleeper};
use crate::source::{PageRequest, PageSource};
use crate::stream::SyncStream;
use std::sync::Arc;
use tidemark_store::{Checkpoint, CheckpointStore, CheckpointValue};

/// Runs a stream on the calling thread.
///
/// Each cycle loads the checkpoint, fetches the page after it, hands the
/// page to the processing function and then commits the checkpoint before
/// fetching again. A crash between processing and commit replays the page
/// on the next run.
pub struct Processor<S: ?Sized, Q, P, R, O, K> {
    stream: SyncStream<S>,
    config: SyncConfig,
    shape: PageShape<R, O, K>,
    source: Q,
    process: P,
    sleeper: Arc<dyn Sleeper>,
}

impl<S, Q, P, R, O, K> Processor<S, Q, P, R, O, K>
where
    S: CheckpointStore + ?Sized,
    Q: PageSource<R>,
    P: FnMut(OffsetIterator<R, O, K>) -> SyncResult<()>,
    K: PartialEq + Clone + Into<CheckpointValue>,
{
    /// Creates a blocking processor.
    pub fn new(
        stream: SyncStream<S>,
        config: SyncConfig,
        shape: PageShape<R, O, K>,
        source: Q,
        process: P,
    ) -> Self {
        Self {
            stream,
            config,
            shape,
            source,
            process,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper used for idle waits and backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The stream being synced.
    pub fn stream(&self) -> &SyncStream<S> {
        &self.stream
    }

    /// Loads the checkpoint and fetches the page after it, retrying
    /// transient failures of either step.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or [`SyncError::RetriesExhausted`].
    pub fn fetch_page(&mut self, limit: usize) -> SyncResult<(Checkpoint, Option<Vec<R>>)> {
        let stream = &self.stream;
        let source = &mut self.source;
        retry_blocking(&self.config.retry, &*self.sleeper, || {
            let checkpoint = stream.load()?;
            let request = PageRequest {
                since: checkpoint.value().cloned(),
                limit,
                offset: checkpoint.offset(),
            };
            let page = source.fetch(&request)?;
            Ok((checkpoint, page))
        })
    }

    /// Runs cycles until a stop condition is met.
    ///
    /// `max_iterations` caps the number of cycles (0 is unbounded). With
    /// `stop_when_caught_up` the loop returns on the first empty or
    /// non-advancing page instead of waiting for new data.
    ///
    /// # Errors
    ///
    /// Any non-transient error from the store, source or processing
    /// function ends the loop; the checkpoint of the failed cycle is not
    /// written.
    pub fn process(
        &mut self,
        limit: usize,
        max_iterations: u64,
        stop_when_caught_up: bool,
    ) -> SyncResult<SyncReport> {
        let policy = policy_for(&self.stream, &self.config, limit, max_iterations, stop_when_caught_up)?;
        let mut report = SyncReport::new();

        loop {
            if policy.should_stop(report.cycles) {
                tracing::info!(stream = %self.stream.name(), cycles = report.cycles, "iteration limit reached");
                return Ok(report.finish(StopReason::IterationLimit));
            }
            report.cycles += 1;

            let (mut checkpoint, page) = self.fetch_page(limit)?;
            let Some(rows) = page else {
                tracing::info!(stream = %self.stream.name(), "source returned no page, stopping");
                return Ok(report.finish(StopReason::SourceUnavailable));
            };

            let records = self.shape.wrap(rows);
            let tracker = records.tracker();
            (self.process)(records)?;
            let summary = tracker.snapshot();
            report.records += summary.processed as u64;

            match policy.after_page(&summary, &mut checkpoint)? {
                Step::Stop(reason) => return Ok(report.finish(reason)),
                Step::Sleep(pause) => {
                    report.idle_waits += 1;
                    self.sleeper.sleep(pause);
                }
                Step::Persist => {
                    self.stream.persist(&mut checkpoint)?;
                    report.advances += 1;
                }
                Step::Continue => {}
            }
        }
    }

    /// Runs until the source has nothing new.
    ///
    /// # Errors
    ///
    /// See [`Processor::process`].
    pub fn process_until_complete(&mut self, limit: usize) -> SyncResult<SyncReport> {
        self.process(limit, 0, true)
    }
}

pub(crate) fn policy_for<S: CheckpointStore + ?Sized>(
    stream: &SyncStream<S>,
    config: &SyncConfig,
    limit: usize,
    max_iterations: u64,
    stop_when_caught_up: bool,
) -> SyncResult<LoopPolicy> {
    if limit == 0 {
        return Err(SyncError::Config(format!(
            "stream '{}': limit must be positive",
            stream.name()
        )));
    }
    Ok(LoopPolicy {
        limit,
        max_iterations,
        stop_when_caught_up,
        idle_sleep: config.idle_sleep,
        dry_run: stream.is_dry_run(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::source::MemorySource;
    use crate::stream::StartOptions;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tidemark_store::InMemoryStore;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }

    fn ids(keys: &[i64]) -> MemorySource<i64> {
        let source = MemorySource::new(|k: &i64| CheckpointValue::Integer(*k)).with_unique_key(true);
        source.extend(keys.iter().copied());
        source
    }

    fn config() -> SyncConfig {
        SyncConfig::new().with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    #[test]
    fn caught_up_unique_stream() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut processor = Processor::new(
            stream,
            config(),
            PageShape::passthrough(|k: &i64| *k).with_unique_key(true),
            ids(&[1, 2, 3, 4, 5]),
            move |page: OffsetIterator<i64, i64, i64>| {
                sink.lock().extend(page);
                Ok(())
            },
        );

        let report = processor.process_until_complete(2).unwrap();
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(report.stop, StopReason::CaughtUp);
        assert_eq!(report.advances, 3);
        assert_eq!(
            processor.stream().load().unwrap().value(),
            Some(&CheckpointValue::Integer(5))
        );
    }

    #[test]
    fn idle_wait_sleeps_once_per_empty_page() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let sleeper = Arc::new(RecordingSleeper::default());

        let mut processor = Processor::new(
            stream,
            config().with_idle_sleep(Duration::from_secs(3)),
            PageShape::passthrough(|k: &i64| *k).with_unique_key(true),
            ids(&[]),
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                Ok(())
            },
        )
        .with_sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>);

        let report = processor.process(10, 1, false).unwrap();
        assert_eq!(report.stop, StopReason::IterationLimit);
        assert_eq!(*sleeper.sleeps.lock(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn unavailable_source_ends_loop() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let mut processor = Processor::new(
            stream,
            config(),
            PageShape::passthrough(|k: &i64| *k),
            |_: &PageRequest| -> SyncResult<Option<Vec<i64>>> { Ok(None) },
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                Ok(())
            },
        );

        let report = processor.process(10, 0, false).unwrap();
        assert_eq!(report.stop, StopReason::SourceUnavailable);
        assert_eq!(report.cycles, 1);
    }

    #[test]
    fn processing_error_skips_commit() {
        let store = Arc::new(InMemoryStore::new());
        let stream = SyncStream::open(Arc::clone(&store), "ids", StartOptions::start(0)).unwrap();
        let mut processor = Processor::new(
            stream,
            config(),
            PageShape::passthrough(|k: &i64| *k).with_unique_key(true),
            ids(&[1, 2]),
            |_: OffsetIterator<i64, i64, i64>| Err(SyncError::Process("sink down".into())),
        );

        assert!(matches!(processor.process(10, 0, true), Err(SyncError::Process(_))));
        assert_eq!(
            processor.stream().load().unwrap().value(),
            Some(&CheckpointValue::Integer(0))
        );
    }

    #[test]
    fn zero_limit_is_rejected() {
        let stream = SyncStream::open(Arc::new(InMemoryStore::new()), "ids", StartOptions::start(0)).unwrap();
        let mut processor = Processor::new(
            stream,
            config(),
            PageShape::passthrough(|k: &i64| *k),
            ids(&[1]),
            |page: OffsetIterator<i64, i64, i64>| {
                page.for_each(drop);
                Ok(())
            },
        );
        assert!(matches!(processor.process(0, 0, true), Err(SyncError::Config(_))));
    }
}
