//! Fixed-capacity circular store of the most recent samples.
//!
//! The buffer is owned by the display tick (single writer, single reader), so it
//! needs no synchronisation of its own. Views are copied out, which keeps them
//! valid across a later [`RingBuffer::resize`].

use super::decoder::Sample;

/// Circular sample store.
///
/// Invariant: the logical contents are the last `min(total_written, capacity)`
/// samples in arrival order.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<Sample>,
    pos: usize,
    total_written: u64,
}

impl RingBuffer {
    /// Allocate a zero-filled buffer (capacity is at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            pos: 0,
            total_written: 0,
        }
    }

    /// Store a sample at the write cursor and advance it.
    pub fn write(&mut self, sample: Sample) {
        self.data[self.pos] = sample;
        self.pos = (self.pos + 1) % self.data.len();
        self.total_written += 1;
    }

    /// Write a batch in order.
    pub fn extend_from_slice(&mut self, samples: &[Sample]) {
        for &sample in samples {
            self.write(sample);
        }
    }

    /// Snapshot of the stored samples, oldest first.
    pub fn ordered_view(&self) -> Vec<Sample> {
        let len = self.len();
        let mut out = Vec::with_capacity(len);
        if self.total_written < self.data.len() as u64 {
            out.extend_from_slice(&self.data[..self.pos]);
        } else {
            out.extend_from_slice(&self.data[self.pos..]);
            out.extend_from_slice(&self.data[..self.pos]);
        }
        out
    }

    /// Most recently written sample.
    pub fn latest(&self) -> Option<Sample> {
        if self.total_written == 0 {
            return None;
        }
        let idx = (self.pos + self.data.len() - 1) % self.data.len();
        Some(self.data[idx])
    }

    /// Reallocate with a new capacity; all contents and counters are discarded.
    pub fn resize(&mut self, new_capacity: usize) {
        self.data = vec![0; new_capacity.max(1)];
        self.pos = 0;
        self.total_written = 0;
    }

    /// Zero the contents and counters without reallocating.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.pos = 0;
        self.total_written = 0;
    }

    /// Number of valid samples, `min(total_written, capacity)`.
    pub fn len(&self) -> usize {
        self.total_written.min(self.data.len() as u64) as usize
    }

    /// Whether nothing has been written since the last reset.
    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    /// Allocated slot count.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current write cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Samples written since the last resize or clear.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}
