//! Bounded drop-oldest queue between the reader task and the display tick.
//!
//! The producer never waits: when the queue is full, the oldest unread sample is
//! evicted to make room. A slow consumer therefore sees stale-but-recent data
//! instead of stalling acquisition. Evictions are counted so the loss is visible.

use super::decoder::Sample;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, bounded FIFO of samples with a drop-oldest overflow policy.
#[derive(Debug)]
pub struct SampleQueue {
    inner: Mutex<Inner>,
    dropped: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<Sample>,
    capacity: usize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
            }),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a sample, evicting exactly one oldest sample if full.
    ///
    /// Returns `true` when an eviction happened.
    pub fn push(&self, sample: Sample) -> bool {
        let mut inner = self.inner.lock();
        let evicted = inner.items.len() >= inner.capacity;
        if evicted {
            inner.items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        inner.items.push_back(sample);
        evicted
    }

    /// Append a batch under a single lock acquisition.
    ///
    /// Equivalent to calling [`push`](Self::push) for each sample in order;
    /// returns the number of evictions.
    pub fn push_all(&self, samples: &[Sample]) -> usize {
        let mut inner = self.inner.lock();
        let mut evicted = 0;
        for &sample in samples {
            if inner.items.len() >= inner.capacity {
                inner.items.pop_front();
                evicted += 1;
            }
            inner.items.push_back(sample);
        }
        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Atomically remove and return everything queued, oldest first.
    pub fn drain_all(&self) -> Vec<Sample> {
        let mut inner = self.inner.lock();
        inner.items.drain(..).collect()
    }

    /// Discard queued samples and change capacity.
    ///
    /// Used when the acquisition config changes; the dropped counter is reset.
    pub fn reset(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut inner = self.inner.lock();
        inner.items = VecDeque::with_capacity(capacity);
        inner.capacity = capacity;
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Discard queued samples, keeping the capacity.
    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    /// Samples currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued samples.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Total samples evicted since creation or the last [`reset`](Self::reset).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_preserves_push_order() {
        let queue = SampleQueue::new(8);
        for v in [3, -1, 7] {
            assert!(!queue.push(v));
        }
        assert_eq!(queue.drain_all(), vec![3, -1, 7]);
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn overflow_keeps_last_capacity_values() {
        let queue = SampleQueue::new(4);
        for v in 0..10 {
            queue.push(v);
        }
        assert_eq!(queue.drain_all(), vec![6, 7, 8, 9]);
        assert_eq!(queue.dropped(), 6);
    }

    #[test]
    fn push_all_matches_individual_pushes() {
        let batch = SampleQueue::new(5);
        let single = SampleQueue::new(5);
        let values: Vec<Sample> = (0..12).collect();

        assert_eq!(batch.push_all(&values), 7);
        for &v in &values {
            single.push(v);
        }
        assert_eq!(batch.drain_all(), single.drain_all());
        assert_eq!(batch.dropped(), single.dropped());
    }

    #[test]
    fn reset_changes_capacity_and_clears() {
        let queue = SampleQueue::new(2);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        queue.reset(3);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn concurrent_producer_never_blocks_or_reorders() {
        let queue = Arc::new(SampleQueue::new(64));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for v in 0..5_000i32 {
                    queue.push((v % 30_000) as Sample);
                }
            })
        };

        let mut seen: Vec<Sample> = Vec::new();
        while !producer.is_finished() {
            seen.extend(queue.drain_all());
        }
        producer.join().unwrap();
        seen.extend(queue.drain_all());

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&4_999));
        assert_eq!(seen.len() as u64 + queue.dropped(), 5_000);
    }
}
