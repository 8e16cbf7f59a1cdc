//! Small reusable checks shared by configuration loading and the ALC validator.
use std::ops::RangeInclusive;

/// Log levels accepted by the configuration and the tracing setup.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validates if a given value is within a specified inclusive range.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a value is one of an explicit set.
pub fn is_one_of<T: PartialEq>(value: T, allowed: &[T]) -> Result<(), &'static str> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err("Value is not one of the allowed values")
    }
}

/// Validates that a float is finite and strictly positive.
///
/// Scale factors, rates and timebases all need this: zero or NaN would make
/// the capacity and frequency arithmetic meaningless.
pub fn is_positive_finite(value: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err("Value must be a finite number greater than 0")
    }
}

/// Validates if a given string is not empty (after trimming).
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates a log level name (case insensitive).
pub fn is_valid_log_level(level: &str) -> Result<(), &'static str> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err("Log level must be one of: trace, debug, info, warn, error")
    }
}
