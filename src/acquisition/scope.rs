//! The display-side consumer of the sample stream.
//!
//! [`Scope::on_tick`] is the single entry point a host calls on its refresh
//! cadence: it drains the [`SampleQueue`], appends to the [`RingBuffer`],
//! converts the window to volts and recomputes [`Statistics`]. It must always be
//! driven from one scheduling context, since it is the ring buffer's only writer.

use super::decoder::Sample;
use super::queue::SampleQueue;
use super::ring_buffer::RingBuffer;
use super::scaling::AcquisitionConfig;
use super::stats::Statistics;
use crate::error::AppResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One refreshed view of the waveform.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    /// Buffer contents in volts, oldest first
    #[serde(skip)]
    pub samples: Vec<f64>,
    /// Statistics over `samples`
    pub stats: Statistics,
    /// Most recent sample in volts
    pub latest_volts: f64,
    /// Samples received since the last clear or reallocation
    pub sample_count: u64,
    /// Samples drained from the queue on this tick
    pub drained: usize,
    /// Samples evicted from the queue so far
    pub dropped: u64,
    /// Time spanned by a full buffer
    pub window_seconds: f64,
}

/// Ring buffer owner and statistics producer.
#[derive(Debug)]
pub struct Scope {
    config: AcquisitionConfig,
    ring: RingBuffer,
    queue: Arc<SampleQueue>,
    paused: bool,
    latest: Option<Sample>,
    sample_count: u64,
    reported_dropped: u64,
}

impl Scope {
    /// Create a scope with buffers sized for `config`.
    pub fn new(config: AcquisitionConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            ring: RingBuffer::new(config.buffer_capacity()),
            queue: Arc::new(SampleQueue::new(config.queue_capacity())),
            config,
            paused: false,
            latest: None,
            sample_count: 0,
            reported_dropped: 0,
        })
    }

    /// Producer handle for the reader task.
    pub fn queue(&self) -> Arc<SampleQueue> {
        Arc::clone(&self.queue)
    }

    /// Current acquisition config.
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Read-only access to the ring buffer.
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Drain pending samples and produce a fresh frame.
    ///
    /// Returns `None` while paused or when no new samples arrived.
    pub fn on_tick(&mut self) -> Option<Frame> {
        if self.paused {
            return None;
        }

        let drained = self.queue.drain_all();
        let latest = *drained.last()?;

        self.ring.extend_from_slice(&drained);
        self.latest = Some(latest);
        self.sample_count += drained.len() as u64;

        let dropped = self.queue.dropped();
        if dropped > self.reported_dropped {
            warn!(
                dropped = dropped - self.reported_dropped,
                total = dropped,
                "Sample queue overflowed; oldest samples discarded"
            );
            self.reported_dropped = dropped;
        }

        let samples = self.config.scale(&self.ring.ordered_view());
        let stats = Statistics::compute(
            &samples,
            self.config.sample_rate_hz,
            self.config.volts_per_count,
        )?;

        Some(Frame {
            samples,
            stats,
            latest_volts: self.config.to_physical(latest),
            sample_count: self.sample_count,
            drained: drained.len(),
            dropped,
            window_seconds: self.config.window_seconds(),
        })
    }

    /// Replace the acquisition config.
    ///
    /// Any change reallocates the ring buffer and queue, discarding buffered
    /// samples. Returns whether a reallocation happened.
    pub fn apply_config(&mut self, config: AcquisitionConfig) -> AppResult<bool> {
        config.validate()?;
        if config == self.config {
            return Ok(false);
        }

        let capacity = config.buffer_capacity();
        info!(
            sample_rate_hz = config.sample_rate_hz,
            timebase_s_per_div = config.timebase_s_per_div,
            capacity,
            "Reallocating sample buffers"
        );
        self.config = config;
        self.ring.resize(capacity);
        self.queue.reset(config.queue_capacity());
        self.reset_counters();
        Ok(true)
    }

    /// Zero the buffer and drop anything queued.
    pub fn clear(&mut self) {
        debug!("Clearing scope buffers");
        self.ring.clear();
        self.queue.clear();
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.latest = None;
        self.sample_count = 0;
        self.reported_dropped = self.queue.dropped();
    }

    /// Toggle pause; returns the new state.
    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.paused);
        self.paused
    }

    /// Pause or resume tick processing.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            debug!(paused, "Scope pause state changed");
        }
        self.paused = paused;
    }

    /// Whether ticks are currently ignored.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Most recent raw sample.
    pub fn latest(&self) -> Option<Sample> {
        self.latest
    }

    /// Samples received since the last clear or reallocation.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}
