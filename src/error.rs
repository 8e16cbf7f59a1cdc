//! Custom error types for the application.
//!
//! This module defines the primary error type, `ScopeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failure that can occur between the serial port, the
//! acquisition pipeline and the ALC command protocol.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: file parsing failures from `figment`, and semantic
//!   problems found by [`crate::config::ScopeConfig::validate`].
//! - **`PortOpen`**, **`NotConnected`**, **`ConnectionLost`**: the physical connection.
//!   A lost connection terminates the reader task and is never retried automatically.
//! - **`Protocol`**: a `Get` response that did not have the expected shape.
//! - **`DeviceRejected`**: the instrument answered with `ERROR`. The raw response is kept verbatim.
//! - **`Timeout`**: neither `OK` nor `ERROR` arrived before the deadline. This is the only
//!   variant reported as retryable.
//! - **`Validation`**: the parameter record failed [`crate::alc::validate`]; nothing was sent.
//!
//! Line decoding failures are deliberately absent: they are recovered inside the reader
//! task (see [`crate::acquisition::DecodeError`]).

use crate::alc::ValidationReport;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ScopeError>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Configuration source could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Physical serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// The serial port could not be opened.
    #[error("Failed to open serial port '{port}': {reason}")]
    PortOpen {
        /// Port path that was requested
        port: String,
        /// Driver error text
        reason: String,
    },

    /// An operation needed a connection but none is open.
    #[error("Serial port not connected")]
    SerialPortNotConnected,

    /// The connection failed or was closed while in use.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Malformed or missing response shape.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The instrument answered `ERROR`.
    #[error("Device rejected command: {response}")]
    DeviceRejected {
        /// Full response text, trimmed
        response: String,
    },

    /// No terminal token arrived before the deadline.
    #[error("No response to '{command}' within {waited:?} (received: {partial:?})")]
    Timeout {
        /// Command that was sent, without line terminator
        command: String,
        /// Deadline that elapsed
        waited: Duration,
        /// Whatever partial text was received
        partial: String,
    },

    /// Parameter validation failed; the command was not transmitted.
    #[error("Parameter validation failed:\n{0}")]
    Validation(ValidationReport),

    /// A background task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

impl ScopeError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScopeError::Timeout { .. })
    }
}

/// Shape errors in instrument responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No line started with the expected prefix.
    #[error("no '+PARAM:ALC,' line in response: {response:?}")]
    MissingParamLine {
        /// Full response text, trimmed
        response: String,
    },

    /// A set command did not start with `AT+PARAM=ALC,`.
    #[error("no 'AT+PARAM=ALC,' prefix in command: {line:?}")]
    MissingSetPrefix {
        /// Command line, trimmed
        line: String,
    },

    /// The parameter line had the wrong number of fields.
    #[error("expected {expected} parameters, got {actual}: {line:?}")]
    FieldCount {
        /// Fields required
        expected: usize,
        /// Fields present
        actual: usize,
        /// Offending line without prefix
        line: String,
    },
}
