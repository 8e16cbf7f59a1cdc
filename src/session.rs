//! Connection lifecycle and tick dispatch.
//!
//! A [`ScopeSession`] owns the [`Scope`] and, while connected, the shared
//! [`SerialLink`] and the reader task feeding the scope's queue. Hosts drive it
//! through [`TickHandler::on_tick`] on their refresh cadence and get a
//! [`CommandChannel`] from it for ALC exchanges.

use crate::acquisition::{AcquisitionConfig, Frame, Scope};
use crate::alc::{CommandChannel, ProtocolTimeouts};
use crate::config::ScopeConfig;
use crate::error::{AppResult, ScopeError};
use crate::serial::{self, DynSerial, ReaderHandle, ReaderState, ReaderSummary, SerialLink, SerialReaderTask};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Something a host refreshes on a timer.
pub trait TickHandler {
    /// Event produced on this tick.
    type Event;

    /// Advance one tick.
    fn on_tick(&mut self) -> Option<Self::Event>;
}

/// What a tick produced.
#[derive(Debug, Clone)]
pub enum ScopeEvent {
    /// Fresh waveform and statistics
    Frame(Frame),
    /// The reader task ended on its own; the session is now disconnected
    ConnectionLost {
        /// Port that was lost
        port: String,
        /// Failure text from the reader
        reason: String,
    },
}

struct Connection {
    link: Arc<SerialLink>,
    reader: ReaderHandle,
}

/// Scope plus its optional live connection.
pub struct ScopeSession {
    scope: Scope,
    poll_interval: Duration,
    stop_grace: Duration,
    timeouts: ProtocolTimeouts,
    connection: Option<Connection>,
}

impl std::fmt::Debug for ScopeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeSession")
            .field("scope", &self.scope)
            .field("port", &self.port_name())
            .finish_non_exhaustive()
    }
}

impl ScopeSession {
    /// Idle session configured from `config`.
    pub fn new(config: &ScopeConfig) -> AppResult<Self> {
        Ok(Self {
            scope: Scope::new(config.acquisition)?,
            poll_interval: config.serial.poll_interval,
            stop_grace: config.serial.stop_grace,
            timeouts: config.protocol,
            connection: None,
        })
    }

    /// Open `port` and start reading.
    ///
    /// Connecting while already connected does nothing.
    pub async fn connect(&mut self, port: &str, baud_rate: u32) -> AppResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let io = serial::open_port(port, baud_rate).await?;
        self.attach(port, io)
    }

    /// Start reading from an already open stream.
    ///
    /// Clears the scope and resumes it if paused. Must be called inside a
    /// tokio runtime.
    pub fn attach(&mut self, name: impl Into<String>, io: DynSerial) -> AppResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let name = name.into();
        self.scope.clear();
        self.scope.set_paused(false);

        let link = SerialLink::new(name.clone(), io);
        let reader =
            SerialReaderTask::new(Arc::clone(&link), self.scope.queue(), self.poll_interval).spawn();
        info!(port = %name, "Connected");
        self.connection = Some(Connection { link, reader });
        Ok(())
    }

    /// Stop the reader and close the port.
    ///
    /// Returns the reader's totals, or `None` when not connected.
    pub async fn disconnect(&mut self) -> Option<ReaderSummary> {
        let Connection { link, reader } = self.connection.take()?;
        let summary = reader.stop(self.stop_grace).await;
        link.close().await;
        info!(port = %link.name(), samples = summary.samples, "Disconnected");
        Some(summary)
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Name of the open port.
    pub fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.link.name())
    }

    /// Reader state while connected.
    pub fn reader_state(&self) -> Option<ReaderState> {
        self.connection.as_ref().map(|c| c.reader.state())
    }

    /// Command channel sharing the open port.
    pub fn commands(&self) -> AppResult<CommandChannel> {
        let connection = self
            .connection
            .as_ref()
            .ok_or(ScopeError::SerialPortNotConnected)?;
        Ok(CommandChannel::new(Arc::clone(&connection.link), self.timeouts))
    }

    /// The scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Mutable scope, for pause and clear.
    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    /// Change acquisition settings; see [`Scope::apply_config`].
    pub fn apply_acquisition(&mut self, config: AcquisitionConfig) -> AppResult<bool> {
        self.scope.apply_config(config)
    }

    fn take_failure(&mut self) -> Option<ScopeEvent> {
        let reason = match self.connection.as_ref()?.reader.state() {
            ReaderState::Failed(reason) => reason,
            _ => return None,
        };
        let Connection { link, .. } = self.connection.take()?;
        link.mark_closed();
        warn!(port = %link.name(), %reason, "Connection lost");
        Some(ScopeEvent::ConnectionLost {
            port: link.name().to_string(),
            reason,
        })
    }
}

impl TickHandler for ScopeSession {
    type Event = ScopeEvent;

    /// Report a lost connection once, otherwise refresh the scope.
    ///
    /// Samples that arrived before the loss are still delivered on later ticks.
    fn on_tick(&mut self) -> Option<ScopeEvent> {
        if let Some(lost) = self.take_failure() {
            return Some(lost);
        }
        self.scope.on_tick().map(ScopeEvent::Frame)
    }
}
