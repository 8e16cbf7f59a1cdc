//! Timed request/response exchanges over a shared [`SerialLink`].

use super::params::AlcParameterRecord;
use super::protocol::{self, Terminal, ERROR_TOKEN, GET_COMMAND};
use super::validator::validate;
use crate::error::{AppResult, ScopeError};
use crate::serial::{drain_pending, SerialLink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

/// Deadlines for command exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimeouts {
    /// Deadline for a parameter query
    #[serde(with = "humantime_serde")]
    pub get_timeout: Duration,
    /// Deadline for a parameter write
    #[serde(with = "humantime_serde")]
    pub set_timeout: Duration,
    /// Longest single read while waiting
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long to keep discarding input after an exchange times out, so a
    /// late reply is not decoded as samples. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub late_reply_window: Duration,
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            get_timeout: Duration::from_secs(3),
            set_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            late_reply_window: Duration::from_millis(200),
        }
    }
}

/// What came back from one exchange.
#[derive(Debug, Clone)]
struct Exchange {
    response: String,
    terminal: Option<Terminal>,
    elapsed: Duration,
}

/// Sends ALC commands on a link shared with the reader task.
///
/// Cloning is cheap; exchanges from clones are serialised by the link.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    link: Arc<SerialLink>,
    timeouts: ProtocolTimeouts,
}

impl CommandChannel {
    /// Channel over `link` with the given deadlines.
    pub fn new(link: Arc<SerialLink>, timeouts: ProtocolTimeouts) -> Self {
        Self { link, timeouts }
    }

    /// Deadlines in use.
    pub fn timeouts(&self) -> ProtocolTimeouts {
        self.timeouts
    }

    /// Query the device's current parameter block.
    #[instrument(skip(self), fields(port = %self.link.name()))]
    pub async fn get(&self) -> AppResult<AlcParameterRecord> {
        let exchange = self.exchange(GET_COMMAND, self.timeouts.get_timeout).await?;

        // A query answer is only trusted when the device reported no error at all.
        if exchange.terminal == Some(Terminal::Error) || exchange.response.contains(ERROR_TOKEN) {
            warn!(response = %exchange.response.trim(), "Device rejected ALC query");
            return Err(ScopeError::DeviceRejected {
                response: exchange.response.trim().to_string(),
            });
        }
        match protocol::parse_get_response(&exchange.response) {
            Ok(record) => {
                info!(elapsed_ms = exchange.elapsed.as_millis() as u64, "Read ALC parameters");
                Ok(record)
            }
            // No usable line and no terminal token: the answer never completed.
            Err(_) if exchange.terminal.is_none() => {
                Err(timeout_error(GET_COMMAND, self.timeouts.get_timeout, &exchange.response))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate `record` and, if valid, write it to the device.
    ///
    /// An invalid record is never transmitted. Returns the device's trimmed response.
    #[instrument(skip(self, record), fields(port = %self.link.name()))]
    pub async fn set(&self, record: &AlcParameterRecord) -> AppResult<String> {
        validate(record)
            .into_result()
            .map_err(ScopeError::Validation)?;

        let command = protocol::format_set_command(record);
        let exchange = self.exchange(&command, self.timeouts.set_timeout).await?;
        match exchange.terminal {
            Some(Terminal::Ok) => {
                info!(elapsed_ms = exchange.elapsed.as_millis() as u64, "Wrote ALC parameters");
                Ok(exchange.response.trim().to_string())
            }
            Some(Terminal::Error) => {
                warn!(response = %exchange.response.trim(), "Device rejected ALC parameters");
                Err(ScopeError::DeviceRejected {
                    response: exchange.response.trim().to_string(),
                })
            }
            None => Err(timeout_error(&command, self.timeouts.set_timeout, &exchange.response)),
        }
    }

    /// Write `command` and collect the response until a terminal token or `deadline`.
    ///
    /// The reader task is parked for the whole exchange. After a timeout the
    /// port is drained for `late_reply_window` before it is handed back.
    async fn exchange(&self, command: &str, deadline: Duration) -> AppResult<Exchange> {
        let _exchange = self.link.begin_exchange();
        let mut port = self.link.lock().await?;

        debug!(command = %command.trim_end(), "Sending command");
        let started = Instant::now();
        port.write_all(command.as_bytes())
            .await
            .map_err(|e| ScopeError::ConnectionLost(e.to_string()))?;
        port.flush()
            .await
            .map_err(|e| ScopeError::ConnectionLost(e.to_string()))?;

        let mut response = String::new();
        let mut buf = [0u8; 256];
        let terminal = loop {
            if let Some(terminal) = protocol::find_terminal(&response) {
                break Some(terminal);
            }
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break None;
            }
            if self.link.is_closed() {
                return Err(ScopeError::ConnectionLost(
                    "serial link closed during command exchange".into(),
                ));
            }

            let wait = self.timeouts.poll_interval.min(remaining);
            match tokio::time::timeout(wait, port.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => return Err(ScopeError::ConnectionLost("end of stream".into())),
                Ok(Ok(n)) => response.push_str(&String::from_utf8_lossy(&buf[..n])),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Ok(Err(e)) => return Err(ScopeError::ConnectionLost(e.to_string())),
            }
        };

        let elapsed = started.elapsed();
        if terminal.is_none() && !self.timeouts.late_reply_window.is_zero() {
            let discarded = drain_pending(&mut port, self.timeouts.late_reply_window).await;
            if discarded > 0 {
                debug!(discarded, "Discarded input after command timeout");
            }
        }
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = response.len(),
            ?terminal,
            "Command exchange finished"
        );
        Ok(Exchange {
            response,
            terminal,
            elapsed,
        })
    }
}

fn timeout_error(command: &str, waited: Duration, partial: &str) -> ScopeError {
    warn!(command = %command.trim_end(), ?waited, "Command timed out");
    ScopeError::Timeout {
        command: command.trim_end().to_string(),
        waited,
        partial: partial.trim().to_string(),
    }
}
