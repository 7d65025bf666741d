//! Bounded FIFO buffer for events awaiting delivery.
//!
//! Overflow evicts the oldest entry and counts it as lost. There is no
//! deduplication on insert; duplicates are caught at validation time.

use crate::error::{StreamError, StreamResult};
use std::collections::VecDeque;
use tracing::warn;

/// Bounded FIFO cache.
#[derive(Debug)]
pub struct StreamCache<T> {
    entries: VecDeque<T>,
    capacity: usize,
    /// Entries evicted on overflow since creation.
    dropped: u64,
}

impl<T> StreamCache<T> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> StreamResult<Self> {
        if capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "cache capacity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        })
    }

    /// Append an entry, returning the evicted oldest entry on overflow.
    pub fn add(&mut self, entry: T) -> Option<T> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.dropped += 1;
            warn!(
                capacity = self.capacity,
                dropped = self.dropped,
                "Stream cache full, dropping oldest entry"
            );
            return self.entries.pop_front();
        }
        None
    }

    /// Remove and return up to `max_batch` oldest entries, in order.
    pub fn drain(&mut self, max_batch: usize) -> Vec<T> {
        let n = max_batch.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    /// Put entries back at the front, keeping their order.
    ///
    /// Used when a drained batch could not be delivered. If the cache
    /// filled up in the meantime, the oldest entries are dropped.
    pub fn requeue_front(&mut self, batch: Vec<T>) {
        for entry in batch.into_iter().rev() {
            self.entries.push_front(entry);
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
            warn!(
                capacity = self.capacity,
                dropped = self.dropped,
                "Stream cache full on requeue, dropping oldest entry"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard all pending entries without counting them as dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            StreamCache::<u32>::new(0),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut cache = StreamCache::new(3).unwrap();
        assert_eq!(cache.add(1), None);
        assert_eq!(cache.add(2), None);
        assert_eq!(cache.add(3), None);

        assert_eq!(cache.add(4), Some(1));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.dropped(), 1);
        assert_eq!(cache.drain(10), vec![2, 3, 4]);
    }

    #[test]
    fn test_drain_batches_in_fifo_order() {
        let mut cache = StreamCache::new(100).unwrap();
        for i in 0..12 {
            cache.add(i);
        }

        assert_eq!(cache.drain(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(cache.len(), 7);
        assert_eq!(cache.drain(5), vec![5, 6, 7, 8, 9]);
        assert_eq!(cache.drain(5), vec![10, 11]);
        assert!(cache.drain(5).is_empty());
        assert!(cache.is_empty());
        assert_eq!(cache.dropped(), 0);
    }

    #[test]
    fn test_requeue_restores_fifo_order() {
        let mut cache = StreamCache::new(4).unwrap();
        for i in 0..4 {
            cache.add(i);
        }
        let batch = cache.drain(2);
        cache.add(4);

        cache.requeue_front(batch);

        assert_eq!(cache.dropped(), 1);
        assert_eq!(cache.drain(10), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_does_not_count_drops() {
        let mut cache = StreamCache::new(2).unwrap();
        cache.add("a");
        cache.add("b");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.dropped(), 0);
        assert_eq!(cache.capacity(), 2);
    }
}
