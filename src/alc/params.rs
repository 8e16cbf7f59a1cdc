//! The 25-field ALC/AGC parameter block.
//!
//! Field order is fixed by the instrument firmware and is the same for the
//! `AT+PARAM?` response and the `AT+PARAM=ALC,...` command. Values are kept as
//! text so that a record loaded from user input or from the device can carry
//! empty or malformed entries until [`super::validate`] reports them.

use crate::error::{AppResult, ProtocolError, ScopeError};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fields in a parameter record.
pub const FIELD_COUNT: usize = 25;

/// ALC operating mode, carried in the `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlcMode {
    /// Normal ALC (`0`)
    Normal,
    /// Limiter (`1`)
    Limiter,
}

impl AlcMode {
    /// Mode for a raw field value, if it names one.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Limiter),
            _ => None,
        }
    }

    /// Lower-case label used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Limiter => "limiter",
        }
    }
}

/// Acceptable values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// 0 or 1
    Flag,
    /// 0 (normal) or 1 (limiter); also selects the attack/decay ranges
    Mode,
    /// Inclusive range
    Range(i64, i64),
    /// Inclusive range depending on the record's mode
    ModeDependent {
        /// Range when `mode == 0`
        normal: (i64, i64),
        /// Range when `mode == 1` (or when mode is unreadable)
        limiter: (i64, i64),
    },
    /// One of an explicit set
    OneOf(&'static [i64]),
}

/// Static description of a field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Wire and config name
    pub name: &'static str,
    /// Default value text
    pub default: &'static str,
    /// Human-readable range
    pub range_text: &'static str,
    /// What the field controls
    pub description: &'static str,
    /// Validation rule
    pub rule: FieldRule,
}

macro_rules! alc_fields {
    ($( $variant:ident => $name:literal, $default:literal, $range:literal, $rule:expr, $desc:literal; )*) => {
        /// One of the 25 parameter fields, in wire order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum AlcField {
            $(
                #[doc = $desc]
                $variant,
            )*
        }

        const SPECS: [FieldSpec; FIELD_COUNT] = [
            $( FieldSpec { name: $name, default: $default, range_text: $range, description: $desc, rule: $rule }, )*
        ];

        impl AlcField {
            /// All fields in wire order.
            pub const ALL: [AlcField; FIELD_COUNT] = [ $( AlcField::$variant, )* ];
        }
    };
}

alc_fields! {
    Enable => "enable", "1", "0-1", FieldRule::Flag, "ALC/AGC enable";
    PgaControlEnable => "pga_control_enable", "1", "0-1", FieldRule::Flag, "Allow ALC to change the PGA gain";
    Mode => "mode", "1", "0-1", FieldRule::Mode, "Operating mode: 0 normal, 1 limiter";
    HoldTimeUs => "hold_time_us", "32000", "0-1000000", FieldRule::Range(0, 1_000_000), "Hold time in microseconds";
    AttackTimeUs => "attack_time_us", "8000", "mode dependent",
        FieldRule::ModeDependent { normal: (125, 128_000), limiter: (32, 32_000) },
        "Attack time in microseconds";
    DecayTimeUs => "decay_time_us", "64000", "mode dependent",
        FieldRule::ModeDependent { normal: (0, 512_000), limiter: (125, 128_000) },
        "Decay time in microseconds";
    ZeroCrossEnable => "zero_cross_enable", "1", "0-1", FieldRule::Flag, "Zero-cross detection enable";
    PgaZeroCrossEnable => "pga_zero_cross_enable", "1", "0-1", FieldRule::Flag, "PGA zero-cross enable";
    FastDecayEnable => "fast_decay_enable", "0", "0-1", FieldRule::Flag, "Fast decay enable";
    NoiseGateEnable => "noise_gate_enable", "1", "0-1", FieldRule::Flag, "Noise gate enable";
    NoiseGateThresholdDb => "noise_gate_threshold_db", "-57", "-81 to -39", FieldRule::Range(-81, -39),
        "Noise gate threshold in dB";
    AmpRecoverEnable => "amp_recover_enable", "1", "0-1", FieldRule::Flag, "Recover gain from measured level";
    SlowClockEnable => "slow_clock_enable", "0", "0-1", FieldRule::Flag, "Slow clock enable";
    ApproxRateHz => "approx_rate_hz", "8000", "8000-96000", FieldRule::Range(8_000, 96_000),
        "Approximate sample rate in Hz";
    PgaTargetHalfDb => "pga_target_half_db", "0", "-36 to 57", FieldRule::Range(-36, 57),
        "PGA target gain in 0.5 dB steps";
    PgaMaxHalfDb => "pga_max_half_db", "33", "-27 to 57", FieldRule::Range(-27, 57),
        "PGA maximum gain in 0.5 dB steps";
    PgaMinHalfDb => "pga_min_half_db", "0", "-36 to 48", FieldRule::Range(-36, 48),
        "PGA minimum gain in 0.5 dB steps";
    LimitEnable => "limit_enable", "0", "0-1", FieldRule::Flag, "Raw level limit enable";
    LimitMaxLow => "limit_max_low", "0", "0-255", FieldRule::Range(0, 255), "Maximum limit, low byte";
    LimitMaxHigh => "limit_max_high", "0", "0-255", FieldRule::Range(0, 255), "Maximum limit, high byte";
    LimitMinLow => "limit_min_low", "0", "0-255", FieldRule::Range(0, 255), "Minimum limit, low byte";
    LimitMinHigh => "limit_min_high", "0", "0-255", FieldRule::Range(0, 255), "Minimum limit, high byte";
    GainAttackJack => "gain_attack_jack", "0", "0-1", FieldRule::Flag, "Jack attack mode for gain";
    CtrlGen => "ctrl_gen", "0", "0-3", FieldRule::Range(0, 3), "Control generation: 0 normal, 1-3 jack";
    Group => "group", "255", "0-3 or 255", FieldRule::OneOf(&[0, 1, 2, 3, 255]),
        "ADC group: 0-3 for one group, 255 for all";
}

impl AlcField {
    /// Zero-based wire position.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Static description.
    pub fn spec(self) -> &'static FieldSpec {
        &SPECS[self.index()]
    }

    /// Wire and config name.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Field at a wire position.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for AlcField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlcField {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.name() == wanted)
            .ok_or_else(|| ScopeError::Configuration(format!("unknown ALC parameter '{wanted}'")))
    }
}

/// A full parameter block, stored as trimmed text in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlcParameterRecord {
    values: [String; FIELD_COUNT],
}

impl Default for AlcParameterRecord {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|i| SPECS[i].default.to_string()),
        }
    }
}

impl AlcParameterRecord {
    /// Record with every field at its default.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Build from exactly [`FIELD_COUNT`] values in wire order.
    pub fn from_fields<I, S>(fields: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let collected: Vec<String> = fields
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        let actual = collected.len();
        let values: [String; FIELD_COUNT] =
            collected
                .try_into()
                .map_err(|fields: Vec<String>| ProtocolError::FieldCount {
                    expected: FIELD_COUNT,
                    actual,
                    line: fields.join(","),
                })?;
        Ok(Self { values })
    }

    /// Raw text of a field.
    pub fn get(&self, field: AlcField) -> &str {
        &self.values[field.index()]
    }

    /// Replace a field's text (trimmed).
    pub fn set(&mut self, field: AlcField, value: impl AsRef<str>) {
        self.values[field.index()] = value.as_ref().trim().to_string();
    }

    /// Replace a field with an integer value.
    pub fn set_value(&mut self, field: AlcField, value: i64) {
        self.values[field.index()] = value.to_string();
    }

    /// Builder-style [`set_value`](Self::set_value).
    pub fn with_value(mut self, field: AlcField, value: i64) -> Self {
        self.set_value(field, value);
        self
    }

    /// Field parsed as an integer, if it is one.
    pub fn value(&self, field: AlcField) -> Option<i64> {
        self.get(field).parse().ok()
    }

    /// Mode, if the `mode` field holds 0 or 1.
    pub fn mode(&self) -> Option<AlcMode> {
        self.value(AlcField::Mode).and_then(AlcMode::from_value)
    }

    /// Apply `name=value` style overrides.
    pub fn apply_overrides<'a, I>(&mut self, pairs: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        for (name, value) in pairs {
            let field: AlcField = name.parse()?;
            self.set(field, value);
        }
        Ok(())
    }

    /// Reset every field to its default.
    pub fn restore_defaults(&mut self) {
        *self = Self::default();
    }

    /// Fields paired with their text, in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (AlcField, &str)> {
        AlcField::ALL
            .into_iter()
            .zip(self.values.iter().map(String::as_str))
    }

    /// Text values in wire order.
    pub fn values(&self) -> &[String; FIELD_COUNT] {
        &self.values
    }
}

impl Serialize for AlcParameterRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (field, value) in self.iter() {
            match value.parse::<i64>() {
                Ok(number) => map.serialize_entry(field.name(), &number)?,
                Err(_) => map.serialize_entry(field.name(), value)?,
            }
        }
        map.end()
    }
}
