//! Page requests and the source contract.

use crate::error::SyncResult;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;
use tidemark_store::CheckpointValue;

/// Arguments of one source query.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Checkpoint value to resume from; `None` before the first key.
    pub since: Option<CheckpointValue>,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Records to skip among those matching `since`.
    pub offset: u64,
}

/// Blocking source of raw record pages.
///
/// Given the same request, a source must return the same page. Returning
/// `Ok(None)` signals the source is unreachable for this cycle and ends the
/// loop; an empty page means there is no new data.
///
/// Closures of the shape `FnMut(&PageRequest) -> SyncResult<Option<Vec<R>>>`
/// implement this trait.
pub trait PageSource<R> {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Source`] when the query fails.
    fn fetch(&mut self, request: &PageRequest) -> SyncResult<Option<Vec<R>>>;
}

impl<R, F> PageSource<R> for F
where
    F: FnMut(&PageRequest) -> SyncResult<Option<Vec<R>>>,
{
    fn fetch(&mut self, request: &PageRequest) -> SyncResult<Option<Vec<R>>> {
        self(request)
    }
}

type SourceKey<R> = Arc<dyn Fn(&R) -> CheckpointValue + Send + Sync>;

/// In-memory paged source over records kept sorted by key.
///
/// Non-unique streams select records with `key >= since`, unique ones
/// `key > since`; the selection then skips `offset` records and takes
/// `limit`. Records can be appended while a loop is reading, and clones share
/// the same records.
pub struct MemorySource<R> {
    records: Arc<RwLock<Vec<R>>>,
    key: SourceKey<R>,
    unique_key: bool,
}

impl<R> Clone for MemorySource<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            key: Arc::clone(&self.key),
            unique_key: self.unique_key,
        }
    }
}

impl<R: Clone> MemorySource<R> {
    /// Creates an empty source keyed by `key`.
    pub fn new(key: impl Fn(&R) -> CheckpointValue + Send + Sync + 'static) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            key: Arc::new(key),
            unique_key: false,
        }
    }

    /// Selects strictly after `since` instead of at-or-after.
    pub fn with_unique_key(mut self, unique_key: bool) -> Self {
        self.unique_key = unique_key;
        self
    }

    /// Adds records, keeping insertion order among equal keys.
    pub fn extend(&self, records: impl IntoIterator<Item = R>) {
        let mut guard = self.records.write();
        guard.extend(records);
        let key = &self.key;
        guard.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if the source holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Answers one request.
    pub fn page(&self, request: &PageRequest) -> Vec<R> {
        let skip = usize::try_from(request.offset).unwrap_or(usize::MAX);
        self.records
            .read()
            .iter()
            .filter(|record| self.selects(record, request.since.as_ref()))
            .skip(skip)
            .take(request.limit)
            .cloned()
            .collect()
    }

    fn selects(&self, record: &R, since: Option<&CheckpointValue>) -> bool {
        let Some(since) = since else {
            return true;
        };
        match (self.key)(record).partial_cmp(since) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => !self.unique_key,
            _ => false,
        }
    }
}

impl<R: Clone> PageSource<R> for MemorySource<R> {
    fn fetch(&mut self, request: &PageRequest) -> SyncResult<Option<Vec<R>>> {
        Ok(Some(self.page(request)))
    }
}
