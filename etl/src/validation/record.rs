//! Raw record validation and normalization.
//!
//! [`RecordValidator`] turns a loosely typed [`RawRecord`] into an
//! [`AdmissionRecord`] or a typed rejection. It is a pure function of the
//! input: nothing is logged or counted here, the orchestrator does that.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{ValidationError, ValidationResult};
use crate::models::{AdmissionRecord, AdmissionType, Gender, RawRecord};

/// Highest accepted age, inclusive.
pub const MAX_AGE: i64 = 120;

/// Highest accepted total cost, inclusive.
pub const MAX_TOTAL_COST: f64 = 1.0e12;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A record that did not pass validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position in the extractor's output
    pub index: usize,
    pub patient_id: String,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: ValidationError,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &ValidationError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

/// Accepted records (input order preserved) and rejections of one batch.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub accepted: Vec<AdmissionRecord>,
    pub rejections: Vec<Rejection>,
}

impl ValidationOutcome {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejections.len()
    }

    /// Share of rejected records; 0 for an empty batch.
    pub fn rejection_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.rejections.len() as f64 / total as f64,
        }
    }
}

/// Checks shape and ranges of raw admissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate and normalize a single record.
    pub fn validate(&self, raw: &RawRecord) -> ValidationResult<AdmissionRecord> {
        if let Some(field) = raw.extra_fields.keys().next() {
            return Err(ValidationError::UnexpectedField(field.clone()));
        }
        if let Some((field, value)) = raw.unparsed_fields.iter().next() {
            return Err(ValidationError::Malformed {
                field: field.clone(),
                value: value.clone(),
            });
        }

        let patient_id = normalize_text(&raw.patient_id);
        if patient_id.is_empty() {
            return Err(ValidationError::EmptyValue("patient_id"));
        }

        let admission_date = raw
            .admission_date
            .ok_or(ValidationError::MissingField("admission_date"))?;

        let age = raw.age.ok_or(ValidationError::MissingField("age"))?;
        if !(0..=MAX_AGE).contains(&age) {
            return Err(ValidationError::AgeOutOfRange(age));
        }

        let gender = required_text(&raw.gender, "gender")?;
        let gender = Gender::from_raw(&gender).ok_or(ValidationError::EmptyValue("gender"))?;

        let admission_type = required_text(&raw.admission_type, "admission_type")?;
        let admission_type = AdmissionType::from_raw(&admission_type)
            .ok_or(ValidationError::EmptyValue("admission_type"))?;

        let condition = required_text(&raw.condition, "condition")?;

        // County is optional; aggregation buckets missing counties as Unknown
        let county = raw
            .county
            .as_deref()
            .map(normalize_text)
            .filter(|c| !c.is_empty());

        let length_of_stay = raw
            .length_of_stay
            .ok_or(ValidationError::MissingField("length_of_stay"))?;
        if !length_of_stay.is_finite() || length_of_stay <= 0.0 {
            return Err(ValidationError::DivisionGuard(length_of_stay));
        }

        let total_cost = raw
            .total_cost
            .ok_or(ValidationError::MissingField("total_cost"))?;
        if !total_cost.is_finite() || total_cost < 0.0 {
            return Err(ValidationError::InvalidCost(total_cost));
        }
        if total_cost > MAX_TOTAL_COST {
            return Err(ValidationError::CostTooLarge(total_cost));
        }
        if !(total_cost / length_of_stay).is_finite() {
            return Err(ValidationError::CostPerDayOverflow {
                total_cost,
                length_of_stay,
            });
        }

        let readmission = raw
            .readmission
            .ok_or(ValidationError::MissingField("readmission"))?;

        Ok(AdmissionRecord {
            patient_id,
            admission_date,
            // Range checked above
            age: age as u8,
            gender,
            county,
            condition,
            admission_type,
            length_of_stay,
            total_cost,
            readmission,
        })
    }

    /// Validate a batch, keeping accepted records in input order.
    pub fn validate_batch(&self, records: &[RawRecord]) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for (index, raw) in records.iter().enumerate() {
            match self.validate(raw) {
                Ok(record) => outcome.accepted.push(record),
                Err(reason) => outcome.rejections.push(Rejection {
                    index,
                    patient_id: raw.patient_id.clone(),
                    reason,
                }),
            }
        }
        outcome
    }
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_text(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

fn required_text(value: &Option<String>, field: &'static str) -> ValidationResult<String> {
    let value = value.as_deref().ok_or(ValidationError::MissingField(field))?;
    let normalized = normalize_text(value);
    if normalized.is_empty() {
        return Err(ValidationError::EmptyValue(field));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::raw;

    #[test]
    fn test_valid_record_accepted() {
        let record = RecordValidator::new().validate(&raw("P000001", 1200.0)).unwrap();
        assert_eq!(record.patient_id, "P000001");
        assert_eq!(record.age, 45);
        assert_eq!(record.gender, Gender::Female);
        assert_eq!(record.admission_type, AdmissionType::Elective);
        assert_eq!(record.county.as_deref(), Some("albany"));
    }

    #[test]
    fn test_zero_length_of_stay_is_division_guard() {
        let mut record = raw("P1", 100.0);
        record.length_of_stay = Some(0.0);
        assert_eq!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::DivisionGuard(0.0))
        );

        record.length_of_stay = Some(-2.0);
        assert!(matches!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::DivisionGuard(_))
        ));
    }

    #[test]
    fn test_nan_length_of_stay_rejected() {
        let mut record = raw("P1", 100.0);
        record.length_of_stay = Some(f64::NAN);
        assert!(matches!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::DivisionGuard(_))
        ));
    }

    #[test]
    fn test_age_range() {
        let validator = RecordValidator::new();
        let mut record = raw("P1", 100.0);

        record.age = Some(121);
        assert_eq!(validator.validate(&record), Err(ValidationError::AgeOutOfRange(121)));

        record.age = Some(-1);
        assert_eq!(validator.validate(&record), Err(ValidationError::AgeOutOfRange(-1)));

        record.age = Some(0);
        assert!(validator.validate(&record).is_ok());

        record.age = Some(120);
        assert!(validator.validate(&record).is_ok());
    }

    #[test]
    fn test_negative_cost_rejected() {
        let record = raw("P1", -5.0);
        assert_eq!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::InvalidCost(-5.0))
        );
        assert!(RecordValidator::new().validate(&raw("P1", 0.0)).is_ok());
    }

    #[test]
    fn test_huge_cost_rejected() {
        let validator = RecordValidator::new();
        assert_eq!(
            validator.validate(&raw("P1", 1.5e308)),
            Err(ValidationError::CostTooLarge(1.5e308))
        );
        assert!(validator.validate(&raw("P1", MAX_TOTAL_COST)).is_ok());

        let mut record = raw("P1", 1.0e12);
        record.length_of_stay = Some(1.0e-300);
        assert!(matches!(
            validator.validate(&record),
            Err(ValidationError::CostPerDayOverflow { .. })
        ));
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let validator = RecordValidator::new();

        let mut record = raw("P1", 100.0);
        record.readmission = None;
        assert_eq!(
            validator.validate(&record),
            Err(ValidationError::MissingField("readmission"))
        );

        let mut record = raw("P1", 100.0);
        record.condition = Some("   ".into());
        assert_eq!(validator.validate(&record), Err(ValidationError::EmptyValue("condition")));

        let record = raw("  ", 100.0);
        assert_eq!(validator.validate(&record), Err(ValidationError::EmptyValue("patient_id")));
    }

    #[test]
    fn test_unexpected_values_normalized_not_rejected() {
        let mut record = raw("P1", 100.0);
        record.gender = Some("  FEMALE ".into());
        record.admission_type = Some("emergency".into());
        record.condition = Some("  heart    disease ".into());

        let accepted = RecordValidator::new().validate(&record).unwrap();
        assert_eq!(accepted.gender, Gender::Female);
        assert_eq!(accepted.admission_type, AdmissionType::Emergency);
        assert_eq!(accepted.condition, "heart disease");
    }

    #[test]
    fn test_blank_county_becomes_none() {
        let mut record = raw("P1", 100.0);
        record.county = Some(" ".into());
        assert_eq!(RecordValidator::new().validate(&record).unwrap().county, None);
    }

    #[test]
    fn test_extra_and_unparsed_fields_rejected() {
        let mut record = raw("P1", 100.0);
        record.extra_fields.insert("insurer".into(), "Acme".into());
        assert_eq!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::UnexpectedField("insurer".into()))
        );

        let mut record = raw("P1", 100.0);
        record.age = None;
        record.unparsed_fields.insert("age".into(), "forty".into());
        assert!(matches!(
            RecordValidator::new().validate(&record),
            Err(ValidationError::Malformed { ref field, .. }) if field == "age"
        ));
    }

    #[test]
    fn test_batch_outcome() {
        let mut bad = raw("P2", 100.0);
        bad.length_of_stay = Some(0.0);
        let records = vec![raw("P1", 100.0), bad, raw("P3", 300.0)];

        let outcome = RecordValidator::new().validate_batch(&records);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[1].patient_id, "P3");
        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(outcome.rejections[0].index, 1);
        assert_eq!(outcome.rejections[0].patient_id, "P2");
        assert!((outcome.rejection_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  New \t York  "), "New York");
    }
}
