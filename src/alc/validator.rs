//! Pure range checking of a parameter record.
//!
//! Every field is checked and every violation reported, so a user editing a
//! record sees all problems at once. The attack and decay ranges depend on the
//! `mode` field; when `mode` is empty or not an integer the limiter ranges are
//! used, and when it is an integer other than 0 or 1 only `mode` itself is
//! flagged.

use super::params::{AlcField, AlcMode, AlcParameterRecord, FieldRule};
use crate::validation::{is_in_range, is_not_empty, is_one_of};
use std::fmt;

/// What is wrong with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Field is empty.
    Empty,
    /// Field is not a base-10 integer.
    NotInteger,
    /// Field must be 0 or 1.
    NotFlag,
    /// Field is outside an inclusive range.
    OutOfRange {
        /// Smallest allowed value
        min: i64,
        /// Largest allowed value
        max: i64,
        /// Mode the range was chosen for, for mode-dependent fields
        mode: Option<AlcMode>,
    },
    /// Field is not one of an explicit set.
    NotAllowed {
        /// Accepted values
        allowed: &'static [i64],
    },
}

/// One failed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending field
    pub field: AlcField,
    /// Its text as checked
    pub value: String,
    /// Constraint that failed
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter {} ({}): ", self.field.index() + 1, self.field)?;
        match &self.kind {
            ViolationKind::Empty => f.write_str("must not be empty"),
            ViolationKind::NotInteger => write!(f, "must be an integer, got {:?}", self.value),
            ViolationKind::NotFlag => write!(f, "must be 0 or 1, got {}", self.value),
            ViolationKind::OutOfRange { min, max, mode } => {
                write!(f, "must be between {min} and {max}")?;
                if let Some(mode) = mode {
                    write!(f, " in {} mode", mode.label())?;
                }
                write!(f, ", got {}", self.value)
            }
            ViolationKind::NotAllowed { allowed } => {
                let list: Vec<String> = allowed.iter().map(i64::to_string).collect();
                write!(f, "must be one of {}, got {}", list.join(", "), self.value)
            }
        }
    }
}

/// All violations found in a record, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport(Vec<Violation>);

impl ValidationReport {
    /// Whether the record was valid.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Violations in field order.
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    /// Whether a particular field was flagged.
    pub fn mentions(&self, field: AlcField) -> bool {
        self.0.iter().any(|v| v.field == field)
    }

    /// `Ok(())` for an empty report, otherwise the report as an error value.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Check every field of `record`.
pub fn validate(record: &AlcParameterRecord) -> ValidationReport {
    // Fallback when mode cannot be read.
    let mode_value = record.get(AlcField::Mode).trim().parse().unwrap_or(1);

    let mut violations = Vec::new();
    for (field, raw) in record.iter() {
        let raw = raw.trim();
        let violation = |kind| Violation {
            field,
            value: raw.to_string(),
            kind,
        };

        if is_not_empty(raw).is_err() {
            violations.push(violation(ViolationKind::Empty));
            continue;
        }
        let Ok(value) = raw.parse::<i64>() else {
            violations.push(violation(ViolationKind::NotInteger));
            continue;
        };

        let kind = match field.spec().rule {
            FieldRule::Flag | FieldRule::Mode => is_one_of(value, &[0, 1])
                .err()
                .map(|_| ViolationKind::NotFlag),
            FieldRule::Range(min, max) => {
                is_in_range(value, min..=max)
                    .err()
                    .map(|_| ViolationKind::OutOfRange {
                        min,
                        max,
                        mode: None,
                    })
            }
            FieldRule::OneOf(allowed) => is_one_of(value, allowed)
                .err()
                .map(|_| ViolationKind::NotAllowed { allowed }),
            FieldRule::ModeDependent { normal, limiter } => {
                // An out-of-set mode is reported on the mode field alone.
                AlcMode::from_value(mode_value).and_then(|mode| {
                    let (min, max) = match mode {
                        AlcMode::Normal => normal,
                        AlcMode::Limiter => limiter,
                    };
                    is_in_range(value, min..=max)
                        .err()
                        .map(|_| ViolationKind::OutOfRange {
                            min,
                            max,
                            mode: Some(mode),
                        })
                })
            }
        };

        if let Some(kind) = kind {
            violations.push(violation(kind));
        }
    }
    ValidationReport(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&AlcParameterRecord::defaults()).is_empty());
    }

    #[test]
    fn attack_range_follows_mode() {
        // 64 us is below the normal-mode floor of 125 but fine for the limiter.
        let limiter = AlcParameterRecord::defaults().with_value(AlcField::AttackTimeUs, 64);
        assert!(validate(&limiter).is_empty());

        let normal = limiter.with_value(AlcField::Mode, 0);
        let report = validate(&normal);
        assert_eq!(report.len(), 1);
        assert_eq!(
            report.violations()[0].kind,
            ViolationKind::OutOfRange {
                min: 125,
                max: 128_000,
                mode: Some(AlcMode::Normal),
            }
        );
    }

    #[test]
    fn decay_range_follows_mode() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 0)
            .with_value(AlcField::DecayTimeUs, 0);
        assert!(validate(&record).is_empty());
        assert!(validate(&record.with_value(AlcField::Mode, 1)).mentions(AlcField::DecayTimeUs));
    }

    #[test]
    fn unreadable_mode_falls_back_to_limiter() {
        let mut record = AlcParameterRecord::defaults().with_value(AlcField::AttackTimeUs, 64);
        record.set(AlcField::Mode, "");
        let report = validate(&record);
        assert_eq!(report.len(), 1);
        assert!(report.mentions(AlcField::Mode));
    }

    #[test]
    fn out_of_set_mode_only_flags_mode() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 2)
            .with_value(AlcField::AttackTimeUs, 999_999);
        let report = validate(&record);
        assert_eq!(report.len(), 1);
        assert_eq!(report.violations()[0].kind, ViolationKind::NotFlag);
    }

    #[test]
    fn group_accepts_only_listed_values() {
        for ok in [0, 1, 2, 3, 255] {
            let record = AlcParameterRecord::defaults().with_value(AlcField::Group, ok);
            assert!(validate(&record).is_empty(), "group {ok}");
        }
        for bad in [4, 254, -1] {
            let record = AlcParameterRecord::defaults().with_value(AlcField::Group, bad);
            assert!(validate(&record).mentions(AlcField::Group), "group {bad}");
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let mut record = AlcParameterRecord::defaults();
        record.set(AlcField::Enable, "");
        record.set(AlcField::HoldTimeUs, "abc");
        record.set_value(AlcField::NoiseGateThresholdDb, -90);
        record.set_value(AlcField::ApproxRateHz, 7_999);
        record.set_value(AlcField::FastDecayEnable, 2);

        let report = validate(&record);
        let flagged: Vec<AlcField> = report.violations().iter().map(|v| v.field).collect();
        assert_eq!(
            flagged,
            vec![
                AlcField::Enable,
                AlcField::HoldTimeUs,
                AlcField::FastDecayEnable,
                AlcField::NoiseGateThresholdDb,
                AlcField::ApproxRateHz,
            ]
        );
        assert_eq!(report.violations()[0].kind, ViolationKind::Empty);
        assert_eq!(report.violations()[1].kind, ViolationKind::NotInteger);
    }

    #[test]
    fn messages_name_position_field_and_value() {
        let record = AlcParameterRecord::defaults().with_value(AlcField::ApproxRateHz, 100);
        let text = validate(&record).to_string();
        assert_eq!(
            text,
            "parameter 14 (approx_rate_hz): must be between 8000 and 96000, got 100"
        );

        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 0)
            .with_value(AlcField::AttackTimeUs, 1);
        assert!(validate(&record).to_string().contains("in normal mode"));
    }

    #[test]
    fn limiter_attack_ceiling_is_inclusive() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 1)
            .with_value(AlcField::AttackTimeUs, 32_000);
        assert!(validate(&record).is_empty());

        let report = validate(&record.with_value(AlcField::AttackTimeUs, 32_001));
        assert_eq!(report.len(), 1);
        assert!(report.mentions(AlcField::AttackTimeUs));
        assert_eq!(
            report.violations()[0].kind,
            ViolationKind::OutOfRange {
                min: 32,
                max: 32_000,
                mode: Some(AlcMode::Limiter),
            }
        );
    }

    #[test]
    fn normal_decay_ceiling_is_inclusive() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 0)
            .with_value(AlcField::DecayTimeUs, 512_000);
        assert!(!validate(&record).mentions(AlcField::DecayTimeUs));

        let report = validate(&record.with_value(AlcField::DecayTimeUs, 512_001));
        assert_eq!(report.len(), 1);
        assert!(report.mentions(AlcField::DecayTimeUs));
    }

    #[test]
    fn non_integer_mode_checks_attack_against_limiter_range() {
        let mut record = AlcParameterRecord::defaults().with_value(AlcField::AttackTimeUs, 64_000);
        record.set(AlcField::Mode, "x");

        let report = validate(&record);
        assert_eq!(report.len(), 2);
        assert_eq!(report.violations()[0].field, AlcField::Mode);
        assert_eq!(report.violations()[0].kind, ViolationKind::NotInteger);
        assert_eq!(report.violations()[1].field, AlcField::AttackTimeUs);
        assert_eq!(
            report.violations()[1].kind,
            ViolationKind::OutOfRange {
                min: 32,
                max: 32_000,
                mode: Some(AlcMode::Limiter),
            }
        );
    }

    #[test]
    fn boundaries_are_inclusive() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::HoldTimeUs, 1_000_000)
            .with_value(AlcField::NoiseGateThresholdDb, -81)
            .with_value(AlcField::PgaMaxHalfDb, 57)
            .with_value(AlcField::PgaMinHalfDb, -36)
            .with_value(AlcField::CtrlGen, 3)
            .with_value(AlcField::AttackTimeUs, 32)
            .with_value(AlcField::DecayTimeUs, 128_000);
        assert!(validate(&record).is_empty());
    }
}
