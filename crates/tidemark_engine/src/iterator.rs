//! Offset-tracking iterator over one fetched page.
//!
//! The iterator yields transformed records lazily and, as a side effect of
//! being consumed, records how many raw records it saw and the last two
//! distinct keys. The sync loop reads that summary afterwards to decide how
//! far the checkpoint may advance.

use parking_lot::Mutex;
use std::sync::Arc;

/// Maps a raw record to its output; `None` suppresses the record.
pub type RowMapper<R, O> = Arc<dyn Fn(R) -> Option<O> + Send + Sync>;

/// Extracts the checkpoint key of a raw record.
pub type KeyExtractor<R, K> = Arc<dyn Fn(&R) -> K + Send + Sync>;

/// How raw records of a stream are transformed and keyed.
pub struct PageShape<R, O, K> {
    mapper: RowMapper<R, O>,
    key: KeyExtractor<R, K>,
    unique_key: bool,
}

impl<R, O, K> PageShape<R, O, K> {
    /// Creates a shape for a stream whose keys may repeat.
    pub fn new(
        mapper: impl Fn(R) -> Option<O> + Send + Sync + 'static,
        key: impl Fn(&R) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            mapper: Arc::new(mapper),
            key: Arc::new(key),
            unique_key: false,
        }
    }

    /// Declares whether every record has a distinct key.
    ///
    /// Unique keys let a full page checkpoint on its final key; a unique
    /// stream that fails to advance is treated as a fatal error.
    pub fn with_unique_key(mut self, unique_key: bool) -> Self {
        self.unique_key = unique_key;
        self
    }

    /// Whether the key space is declared unique.
    pub fn unique_key(&self) -> bool {
        self.unique_key
    }

    /// Wraps a fetched page.
    pub fn wrap(&self, rows: Vec<R>) -> OffsetIterator<R, O, K>
    where
        K: PartialEq,
    {
        OffsetIterator::new(rows, self.clone())
    }
}

impl<R: 'static, K> PageShape<R, R, K> {
    /// Creates a shape that yields every raw record unchanged.
    pub fn passthrough(key: impl Fn(&R) -> K + Send + Sync + 'static) -> Self {
        Self::new(Some, key)
    }
}

impl<R, O, K> Clone for PageShape<R, O, K> {
    fn clone(&self) -> Self {
        Self {
            mapper: Arc::clone(&self.mapper),
            key: Arc::clone(&self.key),
            unique_key: self.unique_key,
        }
    }
}

/// What one page looked like after it was consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary<K> {
    /// Raw records seen, including suppressed ones.
    pub processed: usize,
    /// Raw records in the fetched page.
    pub page_len: usize,
    /// Most recent distinct key.
    pub last_key: Option<K>,
    /// Distinct key seen before `last_key`.
    pub previous_key: Option<K>,
    /// Whether the key space is declared unique.
    pub unique_key: bool,
}

impl<K: PartialEq> PageSummary<K> {
    fn new(page_len: usize, unique_key: bool) -> Self {
        Self {
            processed: 0,
            page_len,
            last_key: None,
            previous_key: None,
            unique_key,
        }
    }

    /// Counts one record and shifts its key into the two-slot window when
    /// it differs from the current one. Runs of equal keys collapse.
    fn observe(&mut self, key: K) {
        self.processed += 1;
        if self.last_key.as_ref() != Some(&key) {
            self.previous_key = self.last_key.take();
            self.last_key = Some(key);
        }
    }

    /// Key the checkpoint may safely move to.
    ///
    /// A full page of non-unique keys may have split a run of equal keys at
    /// the page boundary, so the older of the two tracked keys is returned;
    /// otherwise the most recent one.
    pub fn last_offset(&self, limit: usize) -> Option<&K> {
        if self.processed == limit && !self.unique_key {
            self.previous_key.as_ref()
        } else {
            self.last_key.as_ref()
        }
    }

    /// True when no record was seen.
    pub fn is_empty(&self) -> bool {
        self.processed == 0
    }

    /// Records of the page that were never pulled through the iterator.
    pub fn unconsumed(&self) -> usize {
        self.page_len.saturating_sub(self.processed)
    }
}

/// Shared handle to a page's running summary.
///
/// Stays readable after the [`OffsetIterator`] has been moved into (or
/// dropped by) a processing function.
pub struct PageTracker<K> {
    state: Arc<Mutex<PageSummary<K>>>,
}

impl<K> Clone for PageTracker<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: PartialEq + Clone> PageTracker<K> {
    /// Copies the current summary.
    pub fn snapshot(&self) -> PageSummary<K> {
        self.state.lock().clone()
    }

    /// Raw records seen so far.
    pub fn processed(&self) -> usize {
        self.state.lock().processed
    }

    /// See [`PageSummary::last_offset`].
    pub fn last_offset(&self, limit: usize) -> Option<K> {
        self.state.lock().last_offset(limit).cloned()
    }
}

/// Lazy, single-pass iterator over one page of transformed records.
///
/// For each raw record, in order: count it, extract its key and track it if
/// it differs from the previous distinct key, then map it and yield the
/// output unless the mapper suppressed it.
pub struct OffsetIterator<R, O, K> {
    rows: std::vec::IntoIter<R>,
    shape: PageShape<R, O, K>,
    tracker: PageTracker<K>,
}

impl<R, O, K: PartialEq> OffsetIterator<R, O, K> {
    /// Wraps a raw page.
    pub fn new(rows: Vec<R>, shape: PageShape<R, O, K>) -> Self {
        let summary = PageSummary::new(rows.len(), shape.unique_key);
        Self {
            rows: rows.into_iter(),
            shape,
            tracker: PageTracker {
                state: Arc::new(Mutex::new(summary)),
            },
        }
    }

    /// Handle for reading the summary once the iterator is gone.
    pub fn tracker(&self) -> PageTracker<K> {
        self.tracker.clone()
    }
}

impl<R, O, K: PartialEq + Clone> OffsetIterator<R, O, K> {
    /// Raw records seen so far.
    pub fn processed(&self) -> usize {
        self.tracker.processed()
    }

    /// See [`PageSummary::last_offset`].
    pub fn last_offset(&self, limit: usize) -> Option<K> {
        self.tracker.last_offset(limit)
    }

    /// Copies the current summary.
    pub fn summary(&self) -> PageSummary<K> {
        self.tracker.snapshot()
    }
}

impl<R, O, K: PartialEq> Iterator for OffsetIterator<R, O, K> {
    type Item = O;

    fn next(&mut self) -> Option<O> {
        for row in self.rows.by_ref() {
            let key = (self.shape.key)(&row);
            self.tracker.state.lock().observe(key);

            if let Some(output) = (self.shape.mapper)(row) {
                return Some(output);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.rows.len()))
    }
}
