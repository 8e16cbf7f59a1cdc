//! Serial port access.
//!
//! Everything above this module talks to a [`DynSerial`], so the reader task and
//! the ALC command channel work the same against a real port, a
//! `tokio::io::duplex` pipe or the [`simulator`].

pub mod link;
pub mod reader;
pub mod simulator;

pub use link::{ExchangeGuard, ExchangeState, PortGuard, SerialLink};
pub use reader::{ReaderHandle, ReaderState, ReaderSummary, SerialReaderTask};
pub use simulator::{SimulatedInstrument, SimulatorConfig};

use crate::error::AppResult;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Trait for types that can be used as async serial ports.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Dynamic serial port type.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Driver-level read timeout for opened ports.
pub const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Open `port` at `baud_rate`, 8N1 without flow control.
///
/// The blocking open runs on the blocking pool.
#[cfg(feature = "instrument_serial")]
pub async fn open_port(port: &str, baud_rate: u32) -> AppResult<DynSerial> {
    use crate::error::ScopeError;

    let path = port.to_string();
    let stream = tokio::task::spawn_blocking(move || open_native(&path, baud_rate))
        .await
        .map_err(|e| ScopeError::Task(e.to_string()))?
        .map_err(|e| ScopeError::PortOpen {
            port: port.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Box::new(stream))
}

#[cfg(feature = "instrument_serial")]
fn open_native(path: &str, baud_rate: u32) -> tokio_serial::Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(PORT_TIMEOUT)
        .open_native_async()?;

    tracing::info!(port = path, baud_rate, "Opened serial port");
    Ok(stream)
}

/// Without serial support every open fails.
#[cfg(not(feature = "instrument_serial"))]
pub async fn open_port(port: &str, baud_rate: u32) -> AppResult<DynSerial> {
    tracing::warn!(port, baud_rate, "Serial support is compiled out");
    Err(crate::error::ScopeError::SerialFeatureDisabled)
}

/// Names of serial ports visible to the OS.
#[cfg(feature = "instrument_serial")]
pub fn available_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to enumerate serial ports");
            Vec::new()
        }
    }
}

/// Without serial support there is nothing to list.
#[cfg(not(feature = "instrument_serial"))]
pub fn available_ports() -> Vec<String> {
    Vec::new()
}

/// Read and discard whatever arrives on `port` within `window`.
///
/// Stops early on end of stream or an I/O error. Returns the number of bytes
/// discarded.
pub async fn drain_pending<R: AsyncRead + Unpin>(port: &mut R, window: Duration) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + window;
    let mut discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }
    discarded
}
