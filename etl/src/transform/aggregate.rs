//! Group derived records by one or more keys and reduce each group.
//!
//! # Architecture
//!
//! ```text
//! DerivedRecords                     AggregateTable (ascending by key)
//! ┌───────────────────────────┐      ┌──────────────────────────────┐
//! │ 2024-01 Asthma   $1200    │      │ (2024, 1)  count 2  sum 2100 │
//! │ 2024-02 Diabetes $800     │  →   │ (2024, 2)  count 1  sum  800 │
//! │ 2024-01 Diabetes $900     │      └──────────────────────────────┘
//! └───────────────────────────┘
//! ```
//!
//! Groups live in a `BTreeMap`, so rows come out sorted by key tuple no
//! matter the input order. A record missing a grouping field lands in the
//! [`KeyValue::Unknown`] bucket, which sorts after every known value. Each
//! table is reduced sequentially so floating-point sums are reproducible;
//! independent tables are reduced in parallel by [`aggregate_many`].

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::models::{weekday_name, DerivedRecord};

// =============================================================================
// Keys
// =============================================================================

/// A field a derived record can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Year,
    Month,
    Quarter,
    DayOfWeek,
    AgeGroup,
    Gender,
    AdmissionType,
    Condition,
    County,
    HighCost,
    LongStay,
}

impl GroupField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::DayOfWeek => "day_of_week",
            Self::AgeGroup => "age_group",
            Self::Gender => "gender",
            Self::AdmissionType => "admission_type",
            Self::Condition => "condition",
            Self::County => "county",
            Self::HighCost => "high_cost",
            Self::LongStay => "long_stay",
        }
    }

    /// Key of one record for this field.
    pub fn key_of(self, record: &DerivedRecord) -> KeyValue {
        match self {
            Self::Year => KeyValue::Int(i64::from(record.year)),
            Self::Month => KeyValue::Int(i64::from(record.month)),
            Self::Quarter => KeyValue::Int(i64::from(record.quarter)),
            Self::DayOfWeek => KeyValue::Category {
                rank: record.day_of_week.num_days_from_monday() as u8,
                label: weekday_name(record.day_of_week),
            },
            Self::AgeGroup => KeyValue::Category {
                rank: record.age_group.rank(),
                label: record.age_group.label(),
            },
            Self::Gender => KeyValue::Text(record.admission.gender.as_str().to_string()),
            Self::AdmissionType => {
                KeyValue::Text(record.admission.admission_type.as_str().to_string())
            }
            Self::Condition => text_or_unknown(Some(&record.admission.condition)),
            Self::County => text_or_unknown(record.admission.county.as_deref()),
            Self::HighCost => record.is_high_cost.map_or(KeyValue::Unknown, KeyValue::Bool),
            Self::LongStay => KeyValue::Bool(record.is_long_stay),
        }
    }
}

/// True for text that would print the same as [`KeyValue::Unknown`].
pub fn is_unknown_label(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(KeyValue::UNKNOWN_LABEL)
}

fn text_or_unknown(value: Option<&str>) -> KeyValue {
    match value {
        Some(s) if !s.is_empty() && !is_unknown_label(s) => KeyValue::Text(s.to_string()),
        _ => KeyValue::Unknown,
    }
}

/// One component of a group key.
///
/// Variant order is significant: within a field every known value sorts
/// before `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Int(i64),
    Bool(bool),
    /// Ordered categorical, sorted by rank rather than label
    Category { rank: u8, label: &'static str },
    Text(String),
    Unknown,
}

impl KeyValue {
    pub const UNKNOWN_LABEL: &'static str = "Unknown";
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Category { label, .. } => f.write_str(label),
            Self::Text(s) => f.write_str(s),
            Self::Unknown => f.write_str(Self::UNKNOWN_LABEL),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Category { label, .. } => serializer.serialize_str(label),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Unknown => serializer.serialize_str(Self::UNKNOWN_LABEL),
        }
    }
}

// =============================================================================
// Reductions
// =============================================================================

/// A measure computed per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Count,
    SumCost,
    MeanCost,
    MeanLengthOfStay,
    /// Share of readmitted records
    MeanReadmission,
    MeanRiskScore,
    /// Share of high-cost records among those with a defined flag
    HighCostRate,
}

/// A reduced value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measure {
    Count(u64),
    Real(f64),
}

/// Running totals for one group.
#[derive(Debug, Default)]
struct GroupAccumulator {
    count: u64,
    cost_sum: f64,
    length_of_stay_sum: f64,
    readmissions: u64,
    risk_sum: f64,
    high_cost_known: u64,
    high_cost: u64,
}

impl GroupAccumulator {
    fn add(&mut self, record: &DerivedRecord) {
        self.count += 1;
        self.cost_sum += record.admission.total_cost;
        self.length_of_stay_sum += record.admission.length_of_stay;
        self.risk_sum += record.risk_score;
        if record.admission.readmission {
            self.readmissions += 1;
        }
        if let Some(flag) = record.is_high_cost {
            self.high_cost_known += 1;
            if flag {
                self.high_cost += 1;
            }
        }
    }

    fn measure(&self, reduction: Reduction) -> Measure {
        match reduction {
            Reduction::Count => Measure::Count(self.count),
            Reduction::SumCost => Measure::Real(self.cost_sum),
            Reduction::MeanCost => Measure::Real(mean(self.cost_sum, self.count)),
            Reduction::MeanLengthOfStay => Measure::Real(mean(self.length_of_stay_sum, self.count)),
            Reduction::MeanReadmission => {
                Measure::Real(mean(self.readmissions as f64, self.count))
            }
            Reduction::MeanRiskScore => Measure::Real(mean(self.risk_sum, self.count)),
            Reduction::HighCostRate => {
                Measure::Real(mean(self.high_cost as f64, self.high_cost_known))
            }
        }
    }
}

/// Mean that is zero, not NaN, over zero qualifying values.
fn mean(sum: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Grouping keys and the reductions to compute per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSpec {
    pub keys: Vec<GroupField>,
    pub reductions: Vec<Reduction>,
}

impl AggregateSpec {
    pub fn new(keys: impl Into<Vec<GroupField>>, reductions: impl Into<Vec<Reduction>>) -> Self {
        Self {
            keys: keys.into(),
            reductions: reductions.into(),
        }
    }

    fn key_of(&self, record: &DerivedRecord) -> Vec<KeyValue> {
        self.keys.iter().map(|field| field.key_of(record)).collect()
    }
}

/// One reduced row: the key tuple and one measure per reduction, in spec order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<KeyValue>,
    pub measures: Vec<Measure>,
}

/// Rows of one aggregation, ascending by key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub spec: AggregateSpec,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    /// Index of a reduction's measure within each row.
    pub fn measure_index(&self, reduction: Reduction) -> Option<usize> {
        self.spec.reductions.iter().position(|r| *r == reduction)
    }

    /// Sum of `Count` over all rows, if the table counts.
    pub fn total_count(&self) -> Option<u64> {
        let index = self.measure_index(Reduction::Count)?;
        Some(
            self.rows
                .iter()
                .map(|row| match row.measures[index] {
                    Measure::Count(n) => n,
                    Measure::Real(v) => v as u64,
                })
                .sum(),
        )
    }
}

/// Group and reduce one table.
///
/// Only keys present in the data produce rows.
pub fn aggregate(records: &[DerivedRecord], spec: &AggregateSpec) -> AggregateTable {
    let mut groups: BTreeMap<Vec<KeyValue>, GroupAccumulator> = BTreeMap::new();

    for record in records {
        groups.entry(spec.key_of(record)).or_default().add(record);
    }

    let rows = groups
        .into_iter()
        .map(|(key, acc)| AggregateRow {
            measures: spec.reductions.iter().map(|r| acc.measure(*r)).collect(),
            key,
        })
        .collect();

    AggregateTable {
        spec: spec.clone(),
        rows,
    }
}

/// Reduce several named tables in parallel.
pub fn aggregate_many(
    records: &[DerivedRecord],
    specs: &[(&str, AggregateSpec)],
) -> BTreeMap<String, AggregateTable> {
    specs
        .par_iter()
        .map(|(name, spec)| (name.to_string(), aggregate(records, spec)))
        .collect()
}
