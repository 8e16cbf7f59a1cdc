//! Subscriber setup for the `tracing` events the library emits.
//!
//! The library only emits events; installing a subscriber is the host's call.
//! `RUST_LOG` wins over the configured level when set. Output goes to stderr so
//! frames printed on stdout stay machine-readable.
//!
//! ```no_run
//! use serial_scope::{config::ScopeConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScopeConfig::load()?;
//! tracing_setup::init_from_config(&config)?;
//! tracing::info!("scope host started");
//! # Ok(())
//! # }
//! ```

use crate::config::ScopeConfig;
use crate::error::{AppResult, ScopeError};
use crate::validation::LOG_LEVELS;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, coloured
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Rendering
    pub format: OutputFormat,
    /// Also log span open/close, e.g. around every command exchange
    pub span_events: bool,
    /// Colour output (pretty format only)
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            span_events: false,
            ansi: true,
        }
    }
}

impl LogSettings {
    /// Settings taken from the `[application]` section.
    pub fn from_config(config: &ScopeConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
            ..Default::default()
        })
    }

    /// Use `format`.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span open/close events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Toggle colours.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }

    fn spans(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn build_layer(settings: &LogSettings) -> BoxedLayer {
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(settings.spans());
    let filter = settings.filter();
    match settings.format {
        OutputFormat::Pretty => base.pretty().with_ansi(settings.ansi).with_filter(filter).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).with_filter(filter).boxed(),
        OutputFormat::Json => base.json().with_filter(filter).boxed(),
    }
}

/// Install the global subscriber described by `config`.
pub fn init_from_config(config: &ScopeConfig) -> AppResult<()> {
    init(LogSettings::from_config(config)?)
}

/// Install the global subscriber.
///
/// Calling it again, or after a host installed its own subscriber, is a no-op.
pub fn init(settings: LogSettings) -> AppResult<()> {
    match tracing_subscriber::registry().with(build_layer(&settings)).try_init() {
        Ok(()) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            if message.contains("already been set") || message.contains("already initialized") {
                Ok(())
            } else {
                Err(ScopeError::Configuration(format!("cannot install log subscriber: {message}")))
            }
        }
    }
}

/// Case-insensitive level name to [`Level`].
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    let lower = level.to_lowercase();
    if !LOG_LEVELS.contains(&lower.as_str()) {
        return Err(ScopeError::Configuration(format!(
            "unknown log level '{level}', expected one of {}",
            LOG_LEVELS.join(", ")
        )));
    }
    lower
        .parse()
        .map_err(|_| ScopeError::Configuration(format!("unknown log level '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        let err = parse_log_level("verbose").unwrap_err();
        assert!(err.to_string().contains("verbose"));
    }

    #[test]
    fn settings_follow_application_section() {
        let mut config = ScopeConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = OutputFormat::Json;

        let settings = LogSettings::from_config(&config).unwrap();
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, OutputFormat::Json);
        assert!(!settings.span_events);
    }

    #[test]
    fn second_init_is_a_no_op() {
        let settings = LogSettings::default()
            .with_format(OutputFormat::Compact)
            .with_span_events(true)
            .with_ansi(false);
        assert!(init(settings.clone()).is_ok());
        assert!(init(settings).is_ok());
    }
}
