//! Dataset-wide statistics.
//!
//! The high-cost flag compares every record against one threshold computed
//! over the whole Phase-1 record set. [`DatasetStatistics`] is that single
//! full pass; it is computed once per run and handed explicitly to Phase 2.

use serde::Serialize;

use super::features::Phase1Record;
use crate::error::StatisticError;

/// Fewest observations for which a quantile is defined.
pub const MIN_QUANTILE_SAMPLE: usize = 2;

/// Quantile of values already sorted in ascending order.
///
/// Linear interpolation between the two closest ranks: the value at
/// fractional position `q * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Result<f64, StatisticError> {
    if !(0.0..=1.0).contains(&q) {
        return Err(StatisticError::InvalidLevel(q));
    }
    if sorted.len() < MIN_QUANTILE_SAMPLE {
        return Err(StatisticError::Undefined {
            available: sorted.len(),
            required: MIN_QUANTILE_SAMPLE,
        });
    }
    debug_assert!(sorted.windows(2).all(|w| w[0] <= w[1]), "values must be sorted");

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Quantile of unsorted values.
pub fn quantile<I>(values: I, q: f64) -> Result<f64, StatisticError>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Global statistics required by Phase 2.
///
/// Only obtainable through [`DatasetStatistics::compute`], so a finalized
/// record always carries flags derived from the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStatistics {
    cost_quantile: f64,
    cost_threshold: Option<f64>,
    sample_size: usize,
}

impl DatasetStatistics {
    /// Compute the `cost_quantile` quantile of total cost.
    ///
    /// With fewer than [`MIN_QUANTILE_SAMPLE`] records the threshold is left
    /// undefined rather than failing.
    pub fn compute(records: &[Phase1Record], cost_quantile: f64) -> Result<Self, StatisticError> {
        let costs = records.iter().map(|r| r.admission().total_cost);
        let cost_threshold = match quantile(costs, cost_quantile) {
            Ok(threshold) => Some(threshold),
            Err(StatisticError::Undefined { .. }) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            cost_quantile,
            cost_threshold,
            sample_size: records.len(),
        })
    }

    pub fn cost_quantile(&self) -> f64 {
        self.cost_quantile
    }

    /// Cost above which a record is high cost, if defined.
    pub fn cost_threshold(&self) -> Option<f64> {
        self.cost_threshold
    }

    /// The threshold, or why it is undefined.
    pub fn require_cost_threshold(&self) -> Result<f64, StatisticError> {
        self.cost_threshold.ok_or(StatisticError::Undefined {
            available: self.sample_size,
            required: MIN_QUANTILE_SAMPLE,
        })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}
