//! Checkpoint-advance decision logic shared by both sync loops.
//!
//! One cycle is `FETCH → PROCESS → {ADVANCE | STALE | EMPTY} → (PERSIST |
//! SLEEP | STOP)`. The loops in [`crate::Processor`] and
//! [`crate::AsyncProcessor`] only execute the steps; every decision about
//! what happens after a page is made here.

use crate::error::{SyncError, SyncResult};
use crate::iterator::PageSummary;
use std::time::Duration;
use tidemark_store::{Checkpoint, CheckpointValue};

/// Outcome of [`update_offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The checkpoint moved to a new key with offset 0.
    Advanced,
    /// The key did not move but the page was full; offset grew by `limit`.
    Plateau,
    /// Nothing changed.
    Unchanged,
}

impl Advance {
    /// True if the checkpoint changed and must be persisted.
    pub fn moved(self) -> bool {
        !matches!(self, Advance::Unchanged)
    }
}

/// Why a sync loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's iteration cap was reached.
    IterationLimit,
    /// The source returned no page at all.
    SourceUnavailable,
    /// Dry runs stop after one cycle.
    DryRun,
    /// An empty page arrived while stopping when caught up.
    CaughtUp,
    /// The checkpoint did not move while stopping when caught up.
    NoChanges,
    /// The loop's cancel token was set.
    Cancelled,
}

/// Totals of one call to `process`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Fetch cycles started.
    pub cycles: u64,
    /// Raw records seen across all pages.
    pub records: u64,
    /// Checkpoint writes.
    pub advances: u64,
    /// Idle sleeps after empty pages.
    pub idle_waits: u64,
    /// Why the loop returned.
    pub stop: StopReason,
}

impl SyncReport {
    pub(crate) fn new() -> Self {
        Self {
            cycles: 0,
            records: 0,
            advances: 0,
            idle_waits: 0,
            stop: StopReason::IterationLimit,
        }
    }

    pub(crate) fn finish(mut self, stop: StopReason) -> Self {
        self.stop = stop;
        self
    }
}

/// Decides how the checkpoint advances after a fully consumed page.
///
/// 1. A safe key that differs from the checkpoint's value moves the
///    checkpoint there with offset 0.
/// 2. Otherwise a unique-key stream is broken: the source is not monotonic
///    and continuing would refetch the same page forever.
/// 3. Otherwise a full page means a plateau of equal keys: keep the value
///    and page past it by growing the offset by `limit`.
/// 4. Otherwise nothing changes.
///
/// # Errors
///
/// Returns [`SyncError::KeyNotUnique`] in case 2.
pub fn update_offset<K>(
    summary: &PageSummary<K>,
    limit: usize,
    checkpoint: &mut Checkpoint,
) -> SyncResult<Advance>
where
    K: PartialEq + Clone + Into<CheckpointValue>,
{
    if let Some(value) = summary.last_offset(limit).cloned().map(Into::into) {
        if checkpoint.value() != Some(&value) {
            tracing::debug!(
                stream = %checkpoint.stream(),
                value = %value,
                records = summary.processed,
                "advancing checkpoint"
            );
            checkpoint.set_position(Some(value), 0);
            return Ok(Advance::Advanced);
        }
    }

    if summary.unique_key {
        return Err(SyncError::KeyNotUnique {
            stream: checkpoint.stream().to_string(),
            value: checkpoint
                .value()
                .map_or_else(|| "none".to_string(), ToString::to_string),
        });
    }

    if summary.processed == limit {
        let offset = checkpoint.offset() + limit as u64;
        let value = checkpoint.value().cloned();
        checkpoint.set_position(value, offset);
        tracing::warn!(stream = %checkpoint.stream(), offset, "limit reached, offsetting");
        return Ok(Advance::Plateau);
    }

    tracing::debug!(stream = %checkpoint.stream(), "final offset remains unchanged");
    Ok(Advance::Unchanged)
}

/// What the loop does after a page has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Return from `process`.
    Stop(StopReason),
    /// Wait before the next fetch.
    Sleep(Duration),
    /// Save the mutated checkpoint, then fetch again.
    Persist,
    /// Fetch again without saving.
    Continue,
}

/// Loop parameters of one call to `process`.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
    /// Page size requested from the source.
    pub limit: usize,
    /// Cycle cap; 0 means unbounded.
    pub max_iterations: u64,
    /// Stop instead of sleeping once the source has nothing new.
    pub stop_when_caught_up: bool,
    /// Pause after an empty page.
    pub idle_sleep: Duration,
    /// Stop after the first cycle without writing the checkpoint.
    pub dry_run: bool,
}

impl LoopPolicy {
    /// True once `n` cycles have run and a cap is set.
    pub fn should_stop(&self, n: u64) -> bool {
        self.max_iterations > 0 && n == self.max_iterations
    }

    /// Decides the step after a page, mutating `checkpoint` if it advances.
    ///
    /// # Errors
    ///
    /// Propagates [`update_offset`] errors.
    pub fn after_page<K>(
        &self,
        summary: &PageSummary<K>,
        checkpoint: &mut Checkpoint,
    ) -> SyncResult<Step>
    where
        K: PartialEq + Clone + Into<CheckpointValue>,
    {
        let stream = checkpoint.stream();

        if summary.unconsumed() > 0 {
            tracing::warn!(
                stream = %stream,
                unconsumed = summary.unconsumed(),
                "processing function did not consume the whole page"
            );
        }

        if self.dry_run {
            tracing::debug!(
                stream = %stream,
                records = summary.processed,
                "stopping after iteration (test in progress)"
            );
            return Ok(Step::Stop(StopReason::DryRun));
        }

        if summary.is_empty() {
            if self.stop_when_caught_up {
                tracing::info!(stream = %stream, "caught up, stopping");
                return Ok(Step::Stop(StopReason::CaughtUp));
            }
            tracing::debug!(stream = %stream, "caught up, sleeping");
            return Ok(Step::Sleep(self.idle_sleep));
        }

        if update_offset(summary, self.limit, checkpoint)?.moved() {
            return Ok(Step::Persist);
        }

        if self.stop_when_caught_up {
            tracing::info!(stream = %checkpoint.stream(), "no changes, stopping");
            return Ok(Step::Stop(StopReason::NoChanges));
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::PageShape;
    use tidemark_store::StreamName;

    fn checkpoint(value: Option<i64>, offset: u64) -> Checkpoint {
        Checkpoint::new(StreamName::new("s"), value.map(Into::into), offset)
    }

    fn summary(keys: &[i64], unique: bool) -> PageSummary<i64> {
        let shape = PageShape::passthrough(|k: &i64| *k).with_unique_key(unique);
        let it = shape.wrap(keys.to_vec());
        let tracker = it.tracker();
        it.for_each(drop);
        tracker.snapshot()
    }

    fn policy(limit: usize) -> LoopPolicy {
        LoopPolicy {
            limit,
            max_iterations: 0,
            stop_when_caught_up: false,
            idle_sleep: Duration::from_secs(3),
            dry_run: false,
        }
    }

    #[test]
    fn advances_to_new_key_and_resets_offset() {
        let mut cp = checkpoint(Some(1), 40);
        let advance = update_offset(&summary(&[2, 3], false), 10, &mut cp).unwrap();

        assert_eq!(advance, Advance::Advanced);
        assert_eq!(cp.value(), Some(&CheckpointValue::Integer(3)));
        assert_eq!(cp.offset(), 0);
    }

    #[test]
    fn full_page_advances_to_second_to_last_key() {
        let mut cp = checkpoint(Some(1), 0);
        update_offset(&summary(&[2, 3, 4], false), 3, &mut cp).unwrap();
        assert_eq!(cp.value(), Some(&CheckpointValue::Integer(3)));
    }

    #[test]
    fn plateau_grows_offset_by_limit() {
        let mut cp = checkpoint(Some(5), 3);
        let advance = update_offset(&summary(&[5, 5, 5], false), 3, &mut cp).unwrap();

        assert_eq!(advance, Advance::Plateau);
        assert_eq!(cp.value(), Some(&CheckpointValue::Integer(5)));
        assert_eq!(cp.offset(), 6);
    }

    #[test]
    fn short_stale_page_is_unchanged() {
        let mut cp = checkpoint(Some(5), 0);
        let advance = update_offset(&summary(&[5, 5], false), 3, &mut cp).unwrap();

        assert_eq!(advance, Advance::Unchanged);
        assert_eq!(cp, checkpoint(Some(5), 0));
    }

    #[test]
    fn unique_stream_that_does_not_advance_is_fatal() {
        let mut cp = checkpoint(Some(9), 0);
        let err = update_offset(&summary(&[9], true), 10, &mut cp).unwrap_err();
        assert!(matches!(err, SyncError::KeyNotUnique { ref value, .. } if value == "9"));
    }

    #[test]
    fn key_zero_is_a_real_key() {
        let mut cp = checkpoint(None, 0);
        update_offset(&summary(&[0], true), 10, &mut cp).unwrap();
        assert_eq!(cp.value(), Some(&CheckpointValue::Integer(0)));
    }

    #[test]
    fn should_stop_only_with_cap() {
        let mut p = policy(10);
        assert!(!p.should_stop(0));
        assert!(!p.should_stop(1_000));

        p.max_iterations = 2;
        assert!(!p.should_stop(1));
        assert!(p.should_stop(2));
    }

    #[test]
    fn empty_page_sleeps_or_stops() {
        let mut cp = checkpoint(Some(1), 0);
        let mut p = policy(10);
        assert_eq!(
            p.after_page(&summary(&[], false), &mut cp).unwrap(),
            Step::Sleep(Duration::from_secs(3))
        );

        p.stop_when_caught_up = true;
        assert_eq!(
            p.after_page(&summary(&[], false), &mut cp).unwrap(),
            Step::Stop(StopReason::CaughtUp)
        );
    }

    #[test]
    fn dry_run_stops_before_touching_checkpoint() {
        let mut cp = checkpoint(Some(1), 0);
        let mut p = policy(10);
        p.dry_run = true;

        let step = p.after_page(&summary(&[2, 3], false), &mut cp).unwrap();
        assert_eq!(step, Step::Stop(StopReason::DryRun));
        assert_eq!(cp, checkpoint(Some(1), 0));
    }

    #[test]
    fn advance_persists_and_stale_continues_or_stops() {
        let mut p = policy(10);
        let mut cp = checkpoint(Some(1), 0);
        assert_eq!(
            p.after_page(&summary(&[2], false), &mut cp).unwrap(),
            Step::Persist
        );

        let mut cp = checkpoint(Some(2), 0);
        assert_eq!(
            p.after_page(&summary(&[2], false), &mut cp).unwrap(),
            Step::Continue
        );

        p.stop_when_caught_up = true;
        assert_eq!(
            p.after_page(&summary(&[2], false), &mut cp).unwrap(),
            Step::Stop(StopReason::NoChanges)
        );
    }
}
