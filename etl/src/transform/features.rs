//! Per-record feature derivation.
//!
//! Derivation runs in two phases because one flag depends on a statistic of
//! the whole dataset:
//!
//! ```text
//! AdmissionRecord ──derive──▶ Phase1Record ──finalize(&DatasetStatistics)──▶ DerivedRecord
//!                  (parallel)        │                 (parallel)
//!                                    └──▶ DatasetStatistics::compute (barrier)
//! ```
//!
//! A [`Phase1Record`] has private fields and can only become a
//! [`DerivedRecord`] through [`Phase1Record::finalize`], which takes the
//! statistics by reference.

use chrono::{Datelike, NaiveDateTime, Weekday};
use rayon::prelude::*;

use super::risk::RiskScorer;
use super::statistics::DatasetStatistics;
use crate::config::PipelineConfig;
use crate::error::{ValidationError, ValidationResult};
use crate::models::{title_case, AdmissionRecord, AgeGroup, DerivedRecord};

/// Calendar components of an admission timestamp (naive local time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
    pub day_of_week: Weekday,
}

impl CalendarFields {
    pub fn from_timestamp(timestamp: &NaiveDateTime) -> Self {
        let month = timestamp.month();
        Self {
            year: timestamp.year(),
            month,
            quarter: (month - 1) / 3 + 1,
            day_of_week: timestamp.weekday(),
        }
    }
}

/// A record with every feature that does not depend on the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase1Record {
    admission: AdmissionRecord,
    age_group: AgeGroup,
    calendar: CalendarFields,
    cost_per_day: f64,
    is_long_stay: bool,
}

impl Phase1Record {
    pub fn admission(&self) -> &AdmissionRecord {
        &self.admission
    }

    pub fn age_group(&self) -> AgeGroup {
        self.age_group
    }

    pub fn calendar(&self) -> CalendarFields {
        self.calendar
    }

    pub fn cost_per_day(&self) -> f64 {
        self.cost_per_day
    }

    pub fn is_long_stay(&self) -> bool {
        self.is_long_stay
    }

    /// Phase 2: apply dataset-wide flags and the risk score.
    pub fn finalize(self, statistics: &DatasetStatistics, scorer: &RiskScorer) -> DerivedRecord {
        let is_high_cost = statistics
            .cost_threshold()
            .map(|threshold| self.admission.total_cost > threshold);
        let risk_score = scorer.score(&self.admission);

        DerivedRecord {
            age_group: self.age_group,
            year: self.calendar.year,
            month: self.calendar.month,
            quarter: self.calendar.quarter,
            day_of_week: self.calendar.day_of_week,
            cost_per_day: self.cost_per_day,
            is_long_stay: self.is_long_stay,
            is_high_cost,
            risk_score,
            admission: self.admission,
        }
    }
}

/// Pure per-record feature derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureDeriver {
    long_stay_days: f64,
}

impl FeatureDeriver {
    pub fn new(long_stay_days: f64) -> Self {
        Self { long_stay_days }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.long_stay_days)
    }

    /// Phase 1 for one record.
    ///
    /// Fails only if the record bypassed validation with a non-positive
    /// length of stay.
    pub fn derive(&self, mut admission: AdmissionRecord) -> ValidationResult<Phase1Record> {
        if admission.length_of_stay.is_nan() || admission.length_of_stay <= 0.0 {
            return Err(ValidationError::DivisionGuard(admission.length_of_stay));
        }

        admission.condition = title_case(&admission.condition);
        admission.county = admission.county.as_deref().map(title_case);

        Ok(Phase1Record {
            age_group: AgeGroup::from_age(admission.age),
            calendar: CalendarFields::from_timestamp(&admission.admission_date),
            cost_per_day: admission.total_cost / admission.length_of_stay,
            is_long_stay: admission.length_of_stay > self.long_stay_days,
            admission,
        })
    }

    /// Phase 1 over a batch, fanned out across the rayon pool. Output order
    /// matches input order.
    pub fn derive_all(&self, admissions: Vec<AdmissionRecord>) -> ValidationResult<Vec<Phase1Record>> {
        admissions
            .into_par_iter()
            .map(|admission| self.derive(admission))
            .collect()
    }

    /// Phase 2 over a batch.
    pub fn finalize_all(
        records: Vec<Phase1Record>,
        statistics: &DatasetStatistics,
        scorer: &RiskScorer,
    ) -> Vec<DerivedRecord> {
        records
            .into_par_iter()
            .map(|record| record.finalize(statistics, scorer))
            .collect()
    }
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{admission, timestamp};
    use crate::models::AdmissionType;

    fn derive_dataset(costs: &[f64]) -> Vec<DerivedRecord> {
        let deriver = FeatureDeriver::default();
        let admissions = costs
            .iter()
            .enumerate()
            .map(|(i, &c)| admission(&format!("P{i}"), c))
            .collect();
        let phase1 = deriver.derive_all(admissions).unwrap();
        let stats = DatasetStatistics::compute(&phase1, 0.75).unwrap();
        FeatureDeriver::finalize_all(phase1, &stats, &RiskScorer::default())
    }

    #[test]
    fn test_calendar_fields() {
        let calendar = CalendarFields::from_timestamp(&timestamp("2024-11-06 08:00:00"));
        assert_eq!(calendar.year, 2024);
        assert_eq!(calendar.month, 11);
        assert_eq!(calendar.quarter, 4);
        assert_eq!(calendar.day_of_week, Weekday::Wed);

        assert_eq!(CalendarFields::from_timestamp(&timestamp("2024-01-01 00:00:00")).quarter, 1);
        assert_eq!(CalendarFields::from_timestamp(&timestamp("2024-04-01 00:00:00")).quarter, 2);
        assert_eq!(CalendarFields::from_timestamp(&timestamp("2024-09-30 23:59:59")).quarter, 3);
    }

    #[test]
    fn test_phase_one_features() {
        let mut record = admission("P1", 1000.0);
        record.length_of_stay = 8.0;
        record.county = Some("new york".into());
        record.condition = "heart disease".into();

        let phase1 = FeatureDeriver::default().derive(record).unwrap();
        assert_eq!(phase1.cost_per_day(), 125.0);
        assert!(phase1.is_long_stay());
        assert_eq!(phase1.age_group(), AgeGroup::From36To50);
        assert_eq!(phase1.admission().condition, "Heart Disease");
        assert_eq!(phase1.admission().county.as_deref(), Some("New York"));
    }

    #[test]
    fn test_long_stay_is_strict() {
        let mut record = admission("P1", 100.0);
        record.length_of_stay = 7.0;
        assert!(!FeatureDeriver::default().derive(record.clone()).unwrap().is_long_stay());

        assert!(FeatureDeriver::new(6.5).derive(record).unwrap().is_long_stay());
    }

    #[test]
    fn test_division_guard() {
        let mut record = admission("P1", 100.0);
        record.length_of_stay = 0.0;
        assert_eq!(
            FeatureDeriver::default().derive(record),
            Err(ValidationError::DivisionGuard(0.0))
        );
    }

    #[test]
    fn test_high_cost_against_global_threshold() {
        let records = derive_dataset(&[100.0, 200.0, 300.0, 1000.0]);
        let flags: Vec<_> = records.iter().map(|r| r.is_high_cost).collect();
        assert_eq!(flags, vec![Some(false), Some(false), Some(false), Some(true)]);
    }

    #[test]
    fn test_single_record_leaves_flag_unset() {
        let records = derive_dataset(&[5000.0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].is_high_cost, None);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(derive_dataset(&[]).is_empty());
    }

    #[test]
    fn test_invariants_hold() {
        let costs: Vec<f64> = (0..200).map(|i| (i as f64) * 37.5 + 0.1).collect();
        for record in derive_dataset(&costs) {
            assert!((0.0..=1.0).contains(&record.risk_score));
            let rebuilt = record.cost_per_day * record.admission.length_of_stay;
            assert!((rebuilt - record.admission.total_cost).abs() < 1e-9);
        }
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let deriver = FeatureDeriver::default();
        let mut admissions: Vec<AdmissionRecord> = (0..50)
            .map(|i| admission(&format!("P{i}"), 100.0 + i as f64 * 13.0))
            .collect();
        admissions[3].admission_type = AdmissionType::Emergency;
        admissions[7].readmission = true;

        let first_phase1 = deriver.derive_all(admissions.clone()).unwrap();
        let stats = DatasetStatistics::compute(&first_phase1, 0.75).unwrap();

        let first = FeatureDeriver::finalize_all(first_phase1, &stats, &RiskScorer::default());
        let second = FeatureDeriver::finalize_all(
            deriver.derive_all(admissions).unwrap(),
            &stats,
            &RiskScorer::default(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_parallel_derivation_preserves_order() {
        let admissions: Vec<AdmissionRecord> = (0..1000)
            .map(|i| admission(&format!("P{i:06}"), i as f64))
            .collect();
        let phase1 = FeatureDeriver::default().derive_all(admissions).unwrap();
        for (i, record) in phase1.iter().enumerate() {
            assert_eq!(record.admission().patient_id, format!("P{i:06}"));
        }
    }
}
