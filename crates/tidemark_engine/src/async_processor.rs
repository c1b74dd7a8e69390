//! Cooperative sync loop on tokio.

use crate::config::SyncConfig;
use crate::cycle::{Step, StopReason, SyncReport};
use crate::error::SyncResult;
use crate::iterator::{OffsetIterator, PageShape};
use crate::processor::policy_for;
use crate::retry::Backoff;
use crate::source::PageRequest;
use crate::stream::SyncStream;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidemark_store::{Checkpoint, CheckpointStore, CheckpointValue};

/// Cooperative stop flag for [`AsyncProcessor`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every loop holding this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleeps `total` in slices, checking `cancel` before each one.
///
/// Returns false if the token was set.
pub(crate) async fn sleep_cancellable(total: Duration, slice: Duration, cancel: &CancelToken) -> bool {
    let slice = if slice.is_zero() { total } else { slice };
    let mut remaining = total;

    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let step = remaining.min(slice);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    !cancel.is_cancelled()
}

/// Runs a stream as a tokio task.
///
/// Follows the same cycle as [`crate::Processor`]; fetch, processing,
/// checkpoint I/O and idle waits are all suspension points. Store calls run
/// on the blocking thread pool.
pub struct AsyncProcessor<S: ?Sized, Q, P, R, O, K> {
    stream: SyncStream<S>,
    config: SyncConfig,
    shape: PageShape<R, O, K>,
    source: Q,
    process: P,
    cancel: CancelToken,
}

impl<S, Q, QF, P, PF, R, O, K> AsyncProcessor<S, Q, P, R, O, K>
where
    S: CheckpointStore + ?Sized + 'static,
    Q: FnMut(PageRequest) -> QF,
    QF: Future<Output = SyncResult<Option<Vec<R>>>>,
    P: FnMut(OffsetIterator<R, O, K>) -> PF,
    PF: Future<Output = SyncResult<()>>,
    K: PartialEq + Clone + Into<CheckpointValue>,
{
    /// Creates a cooperative processor.
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
            cancel: CancelToken::new(),
        }
    }

    /// Shares an existing cancel token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this processor.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The stream being synced.
    pub fn stream(&self) -> &SyncStream<S> {
        &self.stream
    }

    pub(crate) fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn try_fetch(&mut self, limit: usize) -> SyncResult<(Checkpoint, Option<Vec<R>>)> {
        let checkpoint = self.stream.load_async().await?;
        let request = PageRequest {
            since: checkpoint.value().cloned(),
            limit,
            offset: checkpoint.offset(),
        };
        let page = (self.source)(request).await?;
        Ok((checkpoint, page))
    }

    /// Loads the checkpoint and fetches the page after it, retrying
    /// transient failures on the tokio timer.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or
    /// [`crate::SyncError::RetriesExhausted`].
    pub async fn fetch_page(&mut self, limit: usize) -> SyncResult<(Checkpoint, Option<Vec<R>>)> {
        let retry = self.config.retry.clone();
        let mut backoff = Backoff::new(&retry);
        loop {
            if let Some(delay) = backoff.pause() {
                tokio::time::sleep(delay).await;
            }
            match self.try_fetch(limit).await {
                Ok(page) => return Ok(page),
                Err(e) => backoff.failed(e)?,
            }
        }
    }

    /// Runs cycles until a stop condition is met or the token is set.
    ///
    /// # Errors
    ///
    /// See [`crate::Processor::process`].
    pub async fn process(
        &mut self,
        limit: usize,
        max_iterations: u64,
        stop_when_caught_up: bool,
    ) -> SyncResult<SyncReport> {
        let policy = policy_for(&self.stream, &self.config, limit, max_iterations, stop_when_caught_up)?;
        let mut report = SyncReport::new();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(stream = %self.stream.name(), "cancelled, stopping");
                return Ok(report.finish(StopReason::Cancelled));
            }
            if policy.should_stop(report.cycles) {
                tracing::info!(stream = %self.stream.name(), cycles = report.cycles, "iteration limit reached");
                return Ok(report.finish(StopReason::IterationLimit));
            }
            report.cycles += 1;

            let (mut checkpoint, page) = self.fetch_page(limit).await?;
            let Some(rows) = page else {
                tracing::info!(stream = %self.stream.name(), "source returned no page, stopping");
                return Ok(report.finish(StopReason::SourceUnavailable));
            };

            let records = self.shape.wrap(rows);
            let tracker = records.tracker();
            (self.process)(records).await?;
            let summary = tracker.snapshot();
            report.records += summary.processed as u64;

            match policy.after_page(&summary, &mut checkpoint)? {
                Step::Stop(reason) => return Ok(report.finish(reason)),
                Step::Sleep(pause) => {
                    report.idle_waits += 1;
                    if !sleep_cancellable(pause, self.config.sleep_slice, &self.cancel).await {
                        tracing::info!(stream = %self.stream.name(), "cancelled while idle, stopping");
                        return Ok(report.finish(StopReason::Cancelled));
                    }
                }
                Step::Persist => {
                    self.stream.persist_async(checkpoint).await?;
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
    /// See [`crate::Processor::process`].
    pub async fn process_until_complete(&mut self, limit: usize) -> SyncResult<SyncReport> {
        self.process(limit, 0, true).await
    }
}
