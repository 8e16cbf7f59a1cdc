//! # Serial Scope Core Library
//!
//! Live waveform acquisition from instruments that stream decimal samples as
//! text over a serial port, plus read/write access to the instrument's 25-field
//! ALC/AGC parameter block over the same port. The library is headless; the
//! `serial-scope` binary is one host, a GUI would be another.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: line decoding, the drop-oldest sample queue, the ring
//!   buffer, unit scaling and waveform statistics, tied together by `Scope`.
//! - **`serial`**: port opening, the `SerialLink` shared between the reader task
//!   and command exchanges, the reader task itself and a simulated instrument.
//! - **`alc`**: the ALC parameter record, its mode-aware validator, the AT
//!   command wire format and the timed `CommandChannel`.
//! - **`session`**: `ScopeSession`, the connect/tick/disconnect context object.
//! - **`config`**: `ScopeConfig` loaded with figment from TOML and environment.
//! - **`error`**: the `ScopeError` enum for centralized error handling.
//! - **`tracing_setup`**: tracing-subscriber initialisation.
//! - **`units`**: timebase and voltage text parsing and formatting.
//! - **`validation`**: small reusable parameter checks.

pub mod acquisition;
pub mod alc;
pub mod config;
pub mod error;
pub mod serial;
pub mod session;
pub mod tracing_setup;
pub mod units;
pub mod validation;

pub use acquisition::{AcquisitionConfig, Frame, Scope, Statistics};
pub use alc::{AlcField, AlcParameterRecord, CommandChannel};
pub use config::ScopeConfig;
pub use error::{AppResult, ScopeError};
pub use session::{ScopeEvent, ScopeSession, TickHandler};
