//! Seeded synthetic admissions.
//!
//! Produces realistic-looking records for demos and load tests. The
//! generator is always seeded explicitly; the same `(count, seed)`
//! yields the same records on every platform.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::{Rng, SeedableRng as _};
use rand_distr::{Distribution, LogNormal};
use rand_pcg::Pcg32;

use super::Extractor;
use crate::error::{SourceError, SourceResult};
use crate::logs::log_success;
use crate::models::{DateRange, RawRecord};

pub const CONDITIONS: [&str; 10] = [
    "Diabetes",
    "Hypertension",
    "Asthma",
    "Heart Disease",
    "Obesity",
    "Depression",
    "Arthritis",
    "Cancer",
    "COPD",
    "Stroke",
];

pub const COUNTIES: [&str; 10] = [
    "Albany",
    "Oneida",
    "Erie",
    "Monroe",
    "Onondaga",
    "Nassau",
    "Suffolk",
    "Westchester",
    "Kings",
    "Queens",
];

/// Admission types with cumulative probabilities.
const ADMISSION_TYPES: [(&str, f64); 3] = [("Emergency", 0.4), ("Elective", 0.8), ("Urgent", 1.0)];

const READMISSION_PROBABILITY: f64 = 0.15;

/// Deterministic generator of raw admissions, one per hour from `start`.
#[derive(Debug, Clone)]
pub struct SyntheticExtractor {
    count: usize,
    seed: u64,
    start: NaiveDateTime,
}

impl SyntheticExtractor {
    pub const DEFAULT_SEED: u64 = 42;

    pub fn new(count: usize, seed: u64) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self { count, seed, start }
    }

    /// Generate every record.
    pub fn generate(&self) -> SourceResult<Vec<RawRecord>> {
        let mut rng = Pcg32::seed_from_u64(self.seed);
        let length_of_stay = lognormal(1.0, 0.8)?;
        let total_cost = lognormal(9.0, 1.2)?;

        (0..self.count)
            .map(|i| -> SourceResult<RawRecord> {
                let offset = TimeDelta::try_hours(i as i64)
                    .ok_or_else(|| SourceError::Generator(format!("offset of {i} hours overflows")))?;
                let admission_date = self
                    .start
                    .checked_add_signed(offset)
                    .ok_or_else(|| SourceError::Generator(format!("record {i} is out of date range")))?;

                let draw: f64 = rng.random();
                let admission_type = ADMISSION_TYPES
                    .iter()
                    .find(|(_, cumulative)| draw < *cumulative)
                    .map_or("Urgent", |(name, _)| *name);

                Ok(RawRecord {
                    patient_id: format!("P{:06}", i + 1),
                    admission_date: Some(admission_date),
                    age: Some(rng.random_range(18..90)),
                    gender: Some(if rng.random_bool(0.5) { "M" } else { "F" }.to_string()),
                    county: Some(COUNTIES[rng.random_range(0..COUNTIES.len())].to_string()),
                    condition: Some(CONDITIONS[rng.random_range(0..CONDITIONS.len())].to_string()),
                    admission_type: Some(admission_type.to_string()),
                    length_of_stay: Some(length_of_stay.sample(&mut rng)),
                    total_cost: Some(total_cost.sample(&mut rng)),
                    readmission: Some(rng.random_bool(READMISSION_PROBABILITY)),
                    ..RawRecord::default()
                })
            })
            .collect()
    }
}

fn lognormal(mu: f64, sigma: f64) -> SourceResult<LogNormal<f64>> {
    LogNormal::new(mu, sigma).map_err(|e| SourceError::Generator(e.to_string()))
}

impl Extractor for SyntheticExtractor {
    async fn extract(&self, range: Option<&DateRange>) -> SourceResult<Vec<RawRecord>> {
        let mut records = self.generate()?;
        if let Some(range) = range {
            records.retain(|r| r.admission_date.map_or(false, |d| range.contains(&d)));
        }
        log_success(format!(
            "Generated {} synthetic records (seed {})",
            records.len(),
            self.seed
        ));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RecordValidator;

    #[test]
    fn test_same_seed_same_records() {
        let a = SyntheticExtractor::new(200, 7).generate().unwrap();
        let b = SyntheticExtractor::new(200, 7).generate().unwrap();
        assert_eq!(a, b);

        let c = SyntheticExtractor::new(200, 8).generate().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_records_are_valid() {
        let records = SyntheticExtractor::new(500, 42).generate().unwrap();
        let outcome = RecordValidator::new().validate_batch(&records);
        assert_eq!(outcome.accepted.len(), 500);
        assert!(outcome.rejections.is_empty());
    }

    #[test]
    fn test_field_ranges() {
        let records = SyntheticExtractor::new(1000, 1).generate().unwrap();
        assert_eq!(records[0].patient_id, "P000001");
        assert_eq!(records[999].patient_id, "P001000");
        for r in &records {
            assert!((18..90).contains(&r.age.unwrap()));
            assert!(r.length_of_stay.unwrap() > 0.0);
            assert!(r.total_cost.unwrap() > 0.0);
        }

        let emergencies = records
            .iter()
            .filter(|r| r.admission_type.as_deref() == Some("Emergency"))
            .count();
        assert!((300..500).contains(&emergencies), "{emergencies}");
    }

    #[test]
    fn test_hourly_timestamps() {
        let records = SyntheticExtractor::new(25, 1).generate().unwrap();
        assert_eq!(
            records[24].admission_date.unwrap().to_string(),
            "2024-01-02 00:00:00"
        );
    }

    #[tokio::test]
    async fn test_extract_filters_range() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        let records = SyntheticExtractor::new(72, 3).extract(Some(&range)).await.unwrap();
        assert_eq!(records.len(), 24);
    }
}
