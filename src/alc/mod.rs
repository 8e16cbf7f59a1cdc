//! ALC/AGC parameter configuration for the instrument.
//!
//! - [`params`]: the 25-field record, field metadata and defaults
//! - [`validator`]: pure, mode-aware range checking
//! - [`protocol`]: AT command encoding and response parsing
//! - [`channel`]: timed exchanges sharing the port with the reader task

pub mod channel;
pub mod params;
pub mod protocol;
pub mod validator;

pub use channel::{CommandChannel, ProtocolTimeouts};
pub use params::{AlcField, AlcMode, AlcParameterRecord, FieldRule, FieldSpec, FIELD_COUNT};
pub use validator::{validate, ValidationReport, Violation, ViolationKind};
