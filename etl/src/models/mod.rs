//! Domain models for the admissions pipeline.
//!
//! - [`RawRecord`] - One admission as delivered by an extractor (loosely typed)
//! - [`AdmissionRecord`] - A raw record that passed validation (strongly typed)
//! - [`DerivedRecord`] - An admission enriched with calendar, cost and risk features
//! - [`Gender`], [`AdmissionType`] - Normalized categorical fields
//! - [`AgeGroup`] - Ordered age bucket
//! - [`DateRange`] - Inclusive extraction window

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// Raw Input
// =============================================================================

/// An unprocessed admission entry.
///
/// Every field but the patient identifier may be missing. Cells the source
/// could not read as the field's type are kept in `unparsed_fields`, and
/// columns outside the admission schema in `extra_fields`; both are rejected
/// by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub patient_id: String,
    pub admission_date: Option<NaiveDateTime>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub county: Option<String>,
    pub condition: Option<String>,
    pub admission_type: Option<String>,
    pub length_of_stay: Option<f64>,
    pub total_cost: Option<f64>,
    pub readmission: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unparsed_fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, String>,
}

// =============================================================================
// Gender
// =============================================================================

/// Patient gender.
///
/// Values outside the known set are kept, lower-cased, as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Gender {
    Male,
    Female,
    Other(String),
}

impl Gender {
    /// Parse a source value. Returns `None` for blank input.
    pub fn from_raw(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "m" | "male" | "man" => Some(Self::Male),
            "f" | "female" | "woman" => Some(Self::Female),
            _ => Some(Self::Other(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Gender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl TryFrom<String> for Gender {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_raw(&value).ok_or_else(|| "gender is empty".to_string())
    }
}

// =============================================================================
// Admission Type
// =============================================================================

/// How the patient was admitted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum AdmissionType {
    Emergency,
    Elective,
    Urgent,
    /// Any other non-empty value, title-cased
    Other(String),
}

impl AdmissionType {
    /// Parse a source value, case-insensitively. Returns `None` for blank input.
    pub fn from_raw(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "" => None,
            "emergency" | "er" => Some(Self::Emergency),
            "elective" => Some(Self::Elective),
            "urgent" => Some(Self::Urgent),
            _ => Some(Self::Other(title_case(trimmed))),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Emergency => "Emergency",
            Self::Elective => "Elective",
            Self::Urgent => "Urgent",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for AdmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AdmissionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl TryFrom<String> for AdmissionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_raw(&value).ok_or_else(|| "admission type is empty".to_string())
    }
}

// =============================================================================
// Age Group
// =============================================================================

/// Ordered age bucket.
///
/// Buckets are inclusive integer ranges matching their labels:
/// `0-17`, `18-35`, `36-50`, `51-65`, `66+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "<18")]
    Under18,
    #[serde(rename = "18-35")]
    From18To35,
    #[serde(rename = "36-50")]
    From36To50,
    #[serde(rename = "51-65")]
    From51To65,
    #[serde(rename = "65+")]
    Over65,
}

impl AgeGroup {
    pub fn from_age(age: u8) -> Self {
        match age {
            0..=17 => Self::Under18,
            18..=35 => Self::From18To35,
            36..=50 => Self::From36To50,
            51..=65 => Self::From51To65,
            _ => Self::Over65,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Under18 => "<18",
            Self::From18To35 => "18-35",
            Self::From36To50 => "36-50",
            Self::From51To65 => "51-65",
            Self::Over65 => "65+",
        }
    }

    /// Position in the ordered categorical
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Validated Admission
// =============================================================================

/// An admission that passed validation.
///
/// `length_of_stay > 0`, `total_cost >= 0`, `age <= 120`. Text fields are
/// trimmed and whitespace-collapsed but keep their source casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub patient_id: String,
    pub admission_date: NaiveDateTime,
    pub age: u8,
    pub gender: Gender,
    pub county: Option<String>,
    pub condition: String,
    pub admission_type: AdmissionType,
    pub length_of_stay: f64,
    pub total_cost: f64,
    pub readmission: bool,
}

// =============================================================================
// Derived Record
// =============================================================================

/// An admission with every derived feature filled in.
///
/// Created once by the feature deriver and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRecord {
    /// The validated admission; `county` and `condition` are title-cased here
    #[serde(flatten)]
    pub admission: AdmissionRecord,
    pub age_group: AgeGroup,
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
    #[serde(serialize_with = "serialize_weekday")]
    pub day_of_week: Weekday,
    pub cost_per_day: f64,
    pub is_long_stay: bool,
    /// `None` when the dataset was too small for a cost threshold
    pub is_high_cost: Option<bool>,
    pub risk_score: f64,
}

/// Full English day name, e.g. `Monday`.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn serialize_weekday<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(weekday_name(*day))
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive range of admission dates requested from an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        let date = timestamp.date();
        date >= self.start && date <= self.end
    }
}

// =============================================================================
// Text Normalization
// =============================================================================

/// Title-case text: the first letter after any non-letter is upper-cased and
/// every other letter lower-cased (`"heart disease"` -> `"Heart Disease"`,
/// `"COPD"` -> `"Copd"`).
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn timestamp(date: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    /// A well-formed raw record; tests override the fields they care about.
    pub fn raw(patient_id: &str, total_cost: f64) -> RawRecord {
        RawRecord {
            patient_id: patient_id.to_string(),
            admission_date: Some(timestamp("2024-03-15 10:30:00")),
            age: Some(45),
            gender: Some("F".to_string()),
            county: Some("albany".to_string()),
            condition: Some("diabetes".to_string()),
            admission_type: Some("Elective".to_string()),
            length_of_stay: Some(4.0),
            total_cost: Some(total_cost),
            readmission: Some(false),
            ..RawRecord::default()
        }
    }

    pub fn admission(patient_id: &str, total_cost: f64) -> AdmissionRecord {
        AdmissionRecord {
            patient_id: patient_id.to_string(),
            admission_date: timestamp("2024-03-15 10:30:00"),
            age: 45,
            gender: Gender::Female,
            county: Some("albany".to_string()),
            condition: "diabetes".to_string(),
            admission_type: AdmissionType::Elective,
            length_of_stay: 4.0,
            total_cost,
            readmission: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_group_boundaries() {
        assert_eq!(AgeGroup::from_age(17), AgeGroup::Under18);
        assert_eq!(AgeGroup::from_age(18), AgeGroup::From18To35);
        assert_eq!(AgeGroup::from_age(35), AgeGroup::From18To35);
        assert_eq!(AgeGroup::from_age(36), AgeGroup::From36To50);
        assert_eq!(AgeGroup::from_age(50), AgeGroup::From36To50);
        assert_eq!(AgeGroup::from_age(51), AgeGroup::From51To65);
        assert_eq!(AgeGroup::from_age(65), AgeGroup::From51To65);
        assert_eq!(AgeGroup::from_age(66), AgeGroup::Over65);
        assert_eq!(AgeGroup::from_age(0), AgeGroup::Under18);
        assert_eq!(AgeGroup::from_age(120), AgeGroup::Over65);
    }

    #[test]
    fn test_age_group_total_and_ordered() {
        let mut previous = AgeGroup::Under18;
        for age in 0..=120u8 {
            let group = AgeGroup::from_age(age);
            assert!(group >= previous, "buckets must not decrease with age");
            previous = group;
        }
        assert_eq!(AgeGroup::Over65.label(), "65+");
        assert_eq!(serde_json::to_value(AgeGroup::Under18).unwrap(), "<18");
    }

    #[test]
    fn test_gender_normalization() {
        assert_eq!(Gender::from_raw(" m "), Some(Gender::Male));
        assert_eq!(Gender::from_raw("FEMALE"), Some(Gender::Female));
        assert_eq!(
            Gender::from_raw("Non-Binary"),
            Some(Gender::Other("non-binary".into()))
        );
        assert_eq!(Gender::from_raw("  "), None);
    }

    #[test]
    fn test_admission_type_case_folded() {
        assert_eq!(
            AdmissionType::from_raw("EMERGENCY"),
            Some(AdmissionType::Emergency)
        );
        assert_eq!(
            AdmissionType::from_raw("trauma center"),
            Some(AdmissionType::Other("Trauma Center".into()))
        );
        assert_eq!(AdmissionType::from_raw(""), None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("heart disease"), "Heart Disease");
        assert_eq!(title_case("COPD"), "Copd");
        assert_eq!(title_case("st. lawrence"), "St. Lawrence");
        assert_eq!(title_case(&title_case("mIXed caSE")), "Mixed Case");
    }

    #[test]
    fn test_date_range_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(range.contains(&fixtures::timestamp("2024-01-31 23:59:59")));
        assert!(!range.contains(&fixtures::timestamp("2024-02-01 00:00:00")));
    }

    #[test]
    fn test_weekday_name() {
        assert_eq!(weekday_name(Weekday::Wed), "Wednesday");
    }
}
