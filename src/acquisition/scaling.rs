//! Acquisition parameters and the raw-code to volts conversion.

use crate::error::{AppResult, ScopeError};
use crate::validation::is_positive_finite;
use serde::{Deserialize, Serialize};

/// Horizontal divisions on the display grid.
pub const H_DIVS: usize = 10;
/// Vertical divisions on the display grid.
pub const V_DIVS: usize = 8;
/// Smallest ring buffer the capacity formula will produce.
pub const MIN_SAMPLES: usize = 64;
/// Largest ring buffer (and queue) the capacity formula will produce.
pub const MAX_SAMPLES: usize = 200_000;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 1000.0;
/// Default timebase, 10 ms/div.
pub const DEFAULT_TIMEBASE_S_PER_DIV: f64 = 0.01;
/// Default scale of one ADC count.
pub const DEFAULT_VOLTS_PER_COUNT: f64 = 1.0;
/// Default vertical scale: the full 16-bit span over the vertical grid.
pub const DEFAULT_VOLTS_PER_DIV: f64 = (i16::MAX as f64 - i16::MIN as f64) / V_DIVS as f64;

/// Sample rate, timebase and vertical scale of the display.
///
/// Every field must be finite and strictly positive; use [`AcquisitionConfig::new`]
/// or [`AcquisitionConfig::validate`] before handing one to the scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Instrument sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
    /// Seconds per horizontal division
    #[serde(default = "default_timebase")]
    pub timebase_s_per_div: f64,
    /// Volts per vertical division
    #[serde(default = "default_volts_per_div")]
    pub volts_per_div: f64,
    /// Volts represented by one ADC count
    #[serde(default = "default_volts_per_count")]
    pub volts_per_count: f64,
}

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE_HZ
}

fn default_timebase() -> f64 {
    DEFAULT_TIMEBASE_S_PER_DIV
}

fn default_volts_per_div() -> f64 {
    DEFAULT_VOLTS_PER_DIV
}

fn default_volts_per_count() -> f64 {
    DEFAULT_VOLTS_PER_COUNT
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            timebase_s_per_div: DEFAULT_TIMEBASE_S_PER_DIV,
            volts_per_div: DEFAULT_VOLTS_PER_DIV,
            volts_per_count: DEFAULT_VOLTS_PER_COUNT,
        }
    }
}

impl AcquisitionConfig {
    /// Build and validate a config.
    pub fn new(
        sample_rate_hz: f64,
        timebase_s_per_div: f64,
        volts_per_div: f64,
        volts_per_count: f64,
    ) -> AppResult<Self> {
        let config = Self {
            sample_rate_hz,
            timebase_s_per_div,
            volts_per_div,
            volts_per_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is finite and positive.
    pub fn validate(&self) -> AppResult<()> {
        let fields = [
            ("sample_rate_hz", self.sample_rate_hz),
            ("timebase_s_per_div", self.timebase_s_per_div),
            ("volts_per_div", self.volts_per_div),
            ("volts_per_count", self.volts_per_count),
        ];
        for (name, value) in fields {
            is_positive_finite(value)
                .map_err(|msg| ScopeError::Configuration(format!("{name} = {value}: {msg}")))?;
        }
        Ok(())
    }

    /// Ring buffer capacity for this config.
    pub fn buffer_capacity(&self) -> usize {
        compute_capacity(self)
    }

    /// Queue capacity for this config.
    pub fn queue_capacity(&self) -> usize {
        queue_capacity(self.buffer_capacity())
    }

    /// Time spanned by the full display width.
    pub fn window_seconds(&self) -> f64 {
        self.timebase_s_per_div * H_DIVS as f64
    }

    /// Convert one raw code to volts.
    pub fn to_physical(&self, sample: i16) -> f64 {
        f64::from(sample) * self.volts_per_count
    }

    /// Convert an ordered run of raw codes to volts.
    pub fn scale(&self, samples: &[i16]) -> Vec<f64> {
        samples.iter().map(|&s| self.to_physical(s)).collect()
    }

    /// Symmetric vertical display range implied by `volts_per_div`.
    pub fn vertical_range(&self) -> (f64, f64) {
        let half = self.volts_per_div * V_DIVS as f64 / 2.0;
        (-half, half)
    }
}

/// Ring buffer capacity: `clamp(round(rate * timebase * H_DIVS), MIN_SAMPLES, MAX_SAMPLES)`.
///
/// Non-finite products clamp to the nearest bound, so the result is always in
/// range and monotonic in `rate * timebase`.
pub fn compute_capacity(config: &AcquisitionConfig) -> usize {
    let target = (config.sample_rate_hz * config.timebase_s_per_div * H_DIVS as f64).round();
    if target.is_nan() {
        return MIN_SAMPLES;
    }
    // `as` saturates for out-of-range floats.
    (target as usize).clamp(MIN_SAMPLES, MAX_SAMPLES)
}

/// Queue capacity for a given ring buffer capacity: four buffers' worth, capped.
pub fn queue_capacity(buffer_capacity: usize) -> usize {
    buffer_capacity.saturating_mul(4).min(MAX_SAMPLES)
}
