//! Analytics over the derived record set.
//!
//! - Key metrics (patients, admissions, means, readmission rate, demographics)
//! - Top-N frequency rankings; ties in count break by ascending key
//! - The high-risk cohort: records whose risk score exceeds a threshold

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::models::DerivedRecord;
use crate::transform::aggregate::is_unknown_label;

/// One entry of a frequency ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
    /// Fraction of all records
    pub share: f64,
}

/// Rank values by frequency, descending, keeping the first `n`.
///
/// `total` is the denominator for each entry's share.
pub fn top_n<'a, I>(values: I, n: usize, total: usize) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }

    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);

    ranked
        .into_iter()
        .map(|(key, count)| RankedEntry {
            key: key.to_string(),
            count,
            share: ratio(count, total as u64),
        })
        .collect()
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean<I: Iterator<Item = f64>>(values: I, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}

/// Headline numbers of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub unique_patients: usize,
    pub total_admissions: usize,
    pub avg_length_of_stay: f64,
    pub avg_cost: f64,
    pub readmission_rate: f64,
    pub avg_age: f64,
    /// Admissions per gender code
    pub gender_distribution: BTreeMap<String, u64>,
}

impl KeyMetrics {
    pub fn compute(records: &[DerivedRecord]) -> Self {
        let n = records.len();
        let unique_patients = records
            .iter()
            .map(|r| r.admission.patient_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let mut gender_distribution = BTreeMap::new();
        for record in records {
            *gender_distribution
                .entry(record.admission.gender.to_string())
                .or_insert(0u64) += 1;
        }

        Self {
            unique_patients,
            total_admissions: n,
            avg_length_of_stay: mean(records.iter().map(|r| r.admission.length_of_stay), n),
            avg_cost: mean(records.iter().map(|r| r.admission.total_cost), n),
            readmission_rate: ratio(
                records.iter().filter(|r| r.admission.readmission).count() as u64,
                n as u64,
            ),
            avg_age: mean(records.iter().map(|r| f64::from(r.admission.age)), n),
            gender_distribution,
        }
    }
}

/// Records whose risk score is strictly above `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighRiskCohort {
    pub threshold: f64,
    pub patient_ids: Vec<String>,
    pub proportion: f64,
}

impl HighRiskCohort {
    pub fn compute(records: &[DerivedRecord], threshold: f64) -> Self {
        let patient_ids: Vec<String> = high_risk_records(records, threshold)
            .map(|r| r.admission.patient_id.clone())
            .collect();
        Self {
            threshold,
            proportion: ratio(patient_ids.len() as u64, records.len() as u64),
            patient_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.patient_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patient_ids.is_empty()
    }
}

/// Iterate the records of the high-risk cohort, in input order.
pub fn high_risk_records(
    records: &[DerivedRecord],
    threshold: f64,
) -> impl Iterator<Item = &DerivedRecord> {
    records.iter().filter(move |r| r.risk_score > threshold)
}

/// Everything the driver reports after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub metrics: KeyMetrics,
    pub top_conditions: Vec<RankedEntry>,
    pub top_counties: Vec<RankedEntry>,
    pub high_risk: HighRiskCohort,
}

/// Computes an [`AnalyticsSummary`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsSummarizer {
    top_n: usize,
    high_risk_threshold: f64,
}

impl AnalyticsSummarizer {
    pub fn new(top_n: usize, high_risk_threshold: f64) -> Self {
        Self {
            top_n,
            high_risk_threshold,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.top_n, config.high_risk_threshold)
    }

    pub fn summarize(&self, records: &[DerivedRecord]) -> AnalyticsSummary {
        let total = records.len();
        AnalyticsSummary {
            metrics: KeyMetrics::compute(records),
            top_conditions: top_n(
                records.iter().map(|r| r.admission.condition.as_str()),
                self.top_n,
                total,
            ),
            // Missing or "Unknown" counties are not ranked
            top_counties: top_n(
                records
                    .iter()
                    .filter_map(|r| r.admission.county.as_deref())
                    .filter(|c| !is_unknown_label(c)),
                self.top_n,
                total,
            ),
            high_risk: HighRiskCohort::compute(records, self.high_risk_threshold),
        }
    }
}

impl Default for AnalyticsSummarizer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
