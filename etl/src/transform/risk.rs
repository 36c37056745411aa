//! Per-record risk scoring.

use crate::config::RiskWeights;
use crate::error::ConfigResult;
use crate::models::{AdmissionRecord, AdmissionType};

/// Patients strictly older than this count as elderly.
pub const ELDERLY_AGE: u8 = 65;

/// Weighted, normalized risk score.
///
/// `score = (elderly? + emergency? + readmission?) / (sum of weights)`, so
/// every score lies in [0, 1] as long as the weights are non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskScorer {
    weights: RiskWeights,
    normalizer: f64,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> ConfigResult<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            normalizer: weights.total(),
        })
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    pub fn score(&self, admission: &AdmissionRecord) -> f64 {
        let mut raw = 0.0;
        if admission.age > ELDERLY_AGE {
            raw += self.weights.elderly;
        }
        if admission.admission_type == AdmissionType::Emergency {
            raw += self.weights.emergency;
        }
        if admission.readmission {
            raw += self.weights.readmission;
        }
        (raw / self.normalizer).clamp(0.0, 1.0)
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        let weights = RiskWeights::default();
        Self {
            weights,
            normalizer: weights.total(),
        }
    }
}
