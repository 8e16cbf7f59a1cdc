//! Text forms of timebase, vertical scale and voltage.
//!
//! Parsing accepts `"10 ms/div"`, `"500us"`, `"2 V"`, `"200 mV/div"` and bare
//! numbers in base units. Formatting picks the unit that keeps the mantissa
//! readable and prints at most six significant digits.

use regex::Regex;
use std::sync::LazyLock;

/// Standard timebase steps in seconds per division.
pub const TIMEBASE_OPTIONS: [f64; 21] = [
    1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6, 1e-3, 2e-3, 5e-3, 10e-3,
    20e-3, 50e-3, 100e-3, 200e-3, 500e-3, 1.0, 2.0, 5.0,
];

/// Standard vertical steps in volts per division.
pub const VOLTS_PER_DIV_OPTIONS: [f64; 13] = [
    0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0,
];

static TIMEBASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]*\.?[0-9]+)\s*(us|µs|ms|s)").expect("Invalid timebase regex")
});

static VOLTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]*\.?[0-9]+)\s*(mv|v)").expect("Invalid voltage regex"));

/// Parse a timebase into seconds per division.
///
/// Returns `None` for unparseable or non-positive input.
pub fn parse_timebase(text: &str) -> Option<f64> {
    let text = text.trim().to_lowercase();
    let value = match TIMEBASE_RE.captures(&text) {
        Some(caps) => {
            let value: f64 = caps[1].parse().ok()?;
            match &caps[2] {
                "us" | "µs" => value * 1e-6,
                "ms" => value * 1e-3,
                _ => value,
            }
        }
        None => text.parse().ok()?,
    };
    positive(value)
}

/// Parse a vertical scale into volts per division.
///
/// Returns `None` for unparseable or non-positive input.
pub fn parse_volts_per_div(text: &str) -> Option<f64> {
    let text = text.trim().to_lowercase();
    let value = match VOLTS_RE.captures(&text) {
        Some(caps) => {
            let value: f64 = caps[1].parse().ok()?;
            if &caps[2] == "mv" {
                value * 1e-3
            } else {
                value
            }
        }
        None => text.parse().ok()?,
    };
    positive(value)
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// `"10 ms/div"`, `"500 us/div"`, `"2 s/div"`.
pub fn format_timebase(seconds_per_div: f64) -> String {
    if seconds_per_div < 1e-3 {
        format!("{} us/div", general(seconds_per_div * 1e6))
    } else if seconds_per_div < 1.0 {
        format!("{} ms/div", general(seconds_per_div * 1e3))
    } else {
        format!("{} s/div", general(seconds_per_div))
    }
}

/// `"200 mV/div"`, `"2 V/div"`.
pub fn format_volts_per_div(volts_per_div: f64) -> String {
    if volts_per_div < 1.0 {
        format!("{} mV/div", general(volts_per_div * 1e3))
    } else {
        format!("{} V/div", general(volts_per_div))
    }
}

/// `"-12.5 mV"`, `"3.3 V"`.
pub fn format_voltage(volts: f64) -> String {
    if volts.abs() < 1.0 {
        format!("{} mV", general(volts * 1e3))
    } else {
        format!("{} V", general(volts))
    }
}

/// `"50 Hz"`, `"1.2 kHz"`, or `"--"` when unknown.
pub fn format_frequency(hz: Option<f64>) -> String {
    match hz {
        Some(hz) if hz >= 1e3 => format!("{} kHz", general(hz / 1e3)),
        Some(hz) => format!("{} Hz", general(hz)),
        None => "--".to_string(),
    }
}

/// Up to six significant digits, trailing zeros removed.
fn general(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", if value == 0.0 { 0.0 } else { value });
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).clamp(0, 12) as usize;
    let text = format!("{value:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
