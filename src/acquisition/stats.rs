//! Live waveform statistics.
//!
//! Everything here is recomputed from scratch on each tick in a single O(N)
//! pass (plus one pass for the crossing count). Frequency comes from a
//! hysteresis zero-crossing counter rather than an FFT: it is coarse but cheap
//! enough for a ~30 ms refresh and robust to a few counts of noise.

use serde::Serialize;

/// Relative hysteresis band, as a fraction of peak-to-peak.
pub const HYSTERESIS_FRACTION: f64 = 0.05;
/// Minimum hysteresis band, in ADC counts.
pub const HYSTERESIS_MIN_COUNTS: f64 = 2.0;

/// Summary of one buffer window, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Peak-to-peak, `max - min`
    pub vpp: f64,
    /// Root mean square
    pub rms: f64,
    /// Estimated fundamental, if at least one full rising crossing was seen
    pub frequency_hz: Option<f64>,
}

impl Statistics {
    /// Compute statistics for an ordered window of physical samples.
    ///
    /// Returns `None` for an empty window.
    pub fn compute(samples: &[f64], sample_rate_hz: f64, volts_per_count: f64) -> Option<Self> {
        let first = *samples.first()?;

        let mut min = first;
        let mut max = first;
        let mut sum_sq = 0.0;
        for &s in samples {
            min = min.min(s);
            max = max.max(s);
            sum_sq += s * s;
        }
        let vpp = max - min;
        let rms = (sum_sq / samples.len() as f64).sqrt();

        Some(Self {
            min,
            max,
            vpp,
            rms,
            frequency_hz: estimate_frequency(samples, min, max, sample_rate_hz, volts_per_count),
        })
    }
}

/// Hysteresis zero-crossing frequency estimate.
///
/// Samples are centred on the mid-range `(max + min) / 2`. A rising crossing is
/// counted when a value below `-threshold` is later followed by a value above
/// `+threshold`, with `threshold = max(5% of vpp, 2 counts)`. The estimate is
/// `crossings / (len / sample_rate_hz)`.
pub fn estimate_frequency(
    samples: &[f64],
    min: f64,
    max: f64,
    sample_rate_hz: f64,
    volts_per_count: f64,
) -> Option<f64> {
    if samples.is_empty() || sample_rate_hz <= 0.0 {
        return None;
    }
    let vpp = max - min;
    if vpp <= 0.0 {
        return None;
    }
    let threshold = (HYSTERESIS_FRACTION * vpp).max(HYSTERESIS_MIN_COUNTS * volts_per_count);
    if threshold <= 0.0 {
        return None;
    }

    let mid = (max + min) / 2.0;
    let crosses = count_rising_crossings(samples.iter().map(|s| s - mid), threshold);

    let duration = samples.len() as f64 / sample_rate_hz;
    if duration <= 0.0 || crosses < 1 {
        return None;
    }
    Some(crosses as f64 / duration)
}

fn count_rising_crossings(centered: impl Iterator<Item = f64>, threshold: f64) -> usize {
    let mut armed = false;
    let mut crosses = 0;
    for c in centered {
        if c < -threshold {
            armed = true;
        } else if armed && c > threshold {
            crosses += 1;
            armed = false;
        }
    }
    crosses
}
