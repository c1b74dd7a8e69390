//! Batching adaptor for processing functions that write in bulk.

/// Iterator over batches of at most `size` items. See [`chunked`].
#[derive(Debug, Clone)]
pub struct Chunked<I> {
    inner: I,
    size: usize,
}

/// Groups `iter` into `Vec` batches of at most `size` items.
///
/// Draining the adaptor drains `iter`, so a processing function that writes
/// batches still consumes its whole page. A `size` of 0 is treated as 1.
pub fn chunked<I: IntoIterator>(iter: I, size: usize) -> Chunked<I::IntoIter> {
    Chunked {
        inner: iter.into_iter(),
        size: size.max(1),
    }
}

impl<I: Iterator> Iterator for Chunked<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        (!batch.is_empty()).then_some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::PageShape;

    #[test]
    fn splits_into_batches() {
        let batches: Vec<Vec<u32>> = chunked(1..=7, 3).collect();
        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn zero_size_means_one() {
        assert_eq!(chunked([1, 2], 0).count(), 2);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert_eq!(chunked(Vec::<u8>::new(), 4).next(), None);
    }

    #[test]
    fn drains_offset_iterator() {
        let page = PageShape::passthrough(|k: &i64| *k).wrap(vec![1, 1, 2, 3, 3]);
        let tracker = page.tracker();

        let sizes: Vec<usize> = chunked(page, 2).map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(tracker.processed(), 5);
        assert_eq!(tracker.snapshot().unconsumed(), 0);
    }
}
