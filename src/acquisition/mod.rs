//! Sample acquisition pipeline: decode, queue, buffer, scale, analyse.
//!
//! ```text
//! reader task ──LineDecoder──▶ SampleQueue ──on_tick──▶ RingBuffer ──scale──▶ Statistics
//! ```
//!
//! The reader task is the queue's only producer; [`Scope::on_tick`] is its only
//! consumer and the ring buffer's only writer.

pub mod decoder;
pub mod queue;
pub mod ring_buffer;
pub mod scaling;
pub mod scope;
pub mod stats;

pub use decoder::{decode_line, DecodeError, LineDecoder, Sample};
pub use queue::SampleQueue;
pub use ring_buffer::RingBuffer;
pub use scaling::{compute_capacity, queue_capacity, AcquisitionConfig, H_DIVS, MAX_SAMPLES, MIN_SAMPLES, V_DIVS};
pub use scope::{Frame, Scope};
pub use stats::{estimate_frequency, Statistics};
