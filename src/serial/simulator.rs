//! In-process stand-in for the instrument.
//!
//! [`SimulatedInstrument::spawn`] returns the host end of a `tokio::io::duplex`
//! pipe. The device end streams a noisy sine as decimal lines and answers the
//! ALC AT commands the way the firmware does, so the whole stack can run
//! without hardware.

use super::DynSerial;
use crate::acquisition::Sample;
use crate::alc::protocol::{self, GET_COMMAND, SET_PREFIX};
use crate::alc::{validate, AlcParameterRecord};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Pipe buffer between host and simulated device.
const PIPE_BYTES: usize = 64 * 1024;

/// Waveform and behaviour of the simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Samples emitted per second
    pub sample_rate_hz: f64,
    /// Sine frequency
    pub frequency_hz: f64,
    /// Peak amplitude in counts
    pub amplitude_counts: f64,
    /// DC offset in counts
    pub offset_counts: f64,
    /// Uniform noise half-width in counts
    pub noise_counts: i32,
    /// Emission batch period
    #[serde(with = "humantime_serde")]
    pub batch_interval: Duration,
    /// Whether samples are streamed at all
    pub streaming: bool,
    /// Whether AT commands are answered
    pub respond_to_commands: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1000.0,
            frequency_hz: 50.0,
            amplitude_counts: 12_000.0,
            offset_counts: 0.0,
            noise_counts: 40,
            batch_interval: Duration::from_millis(10),
            streaming: true,
            respond_to_commands: true,
        }
    }
}

/// A simulated device holding its own ALC parameter block.
#[derive(Debug, Clone)]
pub struct SimulatedInstrument {
    config: SimulatorConfig,
    params: Arc<Mutex<AlcParameterRecord>>,
}

impl SimulatedInstrument {
    /// Device with default parameters.
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            params: Arc::new(Mutex::new(AlcParameterRecord::defaults())),
        }
    }

    /// Parameters as the device currently holds them.
    pub fn params(&self) -> AlcParameterRecord {
        self.params.lock().clone()
    }

    /// Start the device task and hand back the host end of the pipe.
    ///
    /// The task ends when the host end is dropped.
    pub fn spawn(&self) -> (DynSerial, JoinHandle<()>) {
        let (host, device) = tokio::io::duplex(PIPE_BYTES);
        let worker = self.clone();
        let join = tokio::spawn(async move {
            if let Err(e) = worker.run(device).await {
                debug!(error = %e, "Simulated instrument stopped");
            }
        });
        (Box::new(host), join)
    }

    async fn run(self, device: tokio::io::DuplexStream) -> std::io::Result<()> {
        let (mut rx, mut tx) = tokio::io::split(device);
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(self.config.batch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let per_batch = self.config.sample_rate_hz * self.config.batch_interval.as_secs_f64();
        let mut owed = 0.0;
        let mut index: u64 = 0;
        let mut command = Vec::new();
        let mut buf = [0u8; 512];

        info!(
            rate = self.config.sample_rate_hz,
            frequency = self.config.frequency_hz,
            "Simulated instrument running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.config.streaming => {
                    owed += per_batch;
                    let mut out = String::new();
                    while owed >= 1.0 {
                        let sample = self.sample_at(index, &mut rng);
                        out.push_str(&sample.to_string());
                        out.push_str("\r\n");
                        index += 1;
                        owed -= 1.0;
                    }
                    if !out.is_empty() {
                        tx.write_all(out.as_bytes()).await?;
                    }
                }
                read = rx.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    command.extend_from_slice(&buf[..n]);
                    while let Some(end) = command.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = command.drain(..=end).collect();
                        let line = String::from_utf8_lossy(&line);
                        if let Some(reply) = self.answer(line.trim()) {
                            tx.write_all(reply.as_bytes()).await?;
                        }
                    }
                }
            }
        }
    }

    fn sample_at(&self, index: u64, rng: &mut StdRng) -> Sample {
        let t = index as f64 / self.config.sample_rate_hz;
        let noise = if self.config.noise_counts > 0 {
            rng.gen_range(-self.config.noise_counts..=self.config.noise_counts)
        } else {
            0
        };
        let value = self.config.offset_counts
            + self.config.amplitude_counts * (TAU * self.config.frequency_hz * t).sin()
            + f64::from(noise);
        value.round().clamp(f64::from(Sample::MIN), f64::from(Sample::MAX)) as Sample
    }

    /// Reply to one command line, if the device would reply at all.
    fn answer(&self, line: &str) -> Option<String> {
        if line.is_empty() || !self.config.respond_to_commands {
            return None;
        }
        debug!(command = line, "Simulated instrument received command");

        if line == GET_COMMAND.trim() {
            return Some(protocol::format_param_response(&self.params.lock()));
        }
        if line.starts_with(SET_PREFIX) {
            let accepted = protocol::parse_set_command(line)
                .ok()
                .filter(|record| validate(record).is_empty());
            return Some(match accepted {
                Some(record) => {
                    *self.params.lock() = record;
                    "OK\r\n".to_string()
                }
                None => "ERROR\r\n".to_string(),
            });
        }
        Some("ERROR\r\n".to_string())
    }
}
