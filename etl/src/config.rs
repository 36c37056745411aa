//! Run configuration.
//!
//! A [`PipelineConfig`] is an explicit value handed to the pipeline; nothing
//! here is global. It can be loaded from a JSON file, overridden from the
//! environment, and must pass [`PipelineConfig::validate`] before a run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::models::DateRange;

/// Environment variable overriding `cost_quantile_threshold`.
pub const ENV_COST_QUANTILE: &str = "HEALTHETL_COST_QUANTILE";
/// Environment variable overriding `long_stay_days`.
pub const ENV_LONG_STAY_DAYS: &str = "HEALTHETL_LONG_STAY_DAYS";
/// Environment variable overriding `rejection_abort_ratio`.
pub const ENV_REJECTION_ABORT_RATIO: &str = "HEALTHETL_REJECTION_ABORT_RATIO";

/// Weights of the additive risk score.
///
/// The score is normalized by the sum of the weights, so any non-negative
/// scheme with a positive sum keeps scores in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Added when the patient is older than 65
    pub elderly: f64,
    /// Added for emergency admissions
    pub emergency: f64,
    /// Added for readmissions
    pub readmission: f64,
}

impl RiskWeights {
    /// Normalization constant: the maximum reachable raw score.
    pub fn total(&self) -> f64 {
        self.elderly + self.emergency + self.readmission
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, weight) in [
            ("elderly", self.elderly),
            ("emergency", self.emergency),
            ("readmission", self.readmission),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "risk_weights",
                    message: format!("weight '{}' must be a non-negative number, got {}", name, weight),
                });
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "risk_weights",
                message: "weights must not all be zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            elderly: 2.0,
            emergency: 3.0,
            readmission: 4.0,
        }
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Admission window requested from the extractor (inclusive)
    pub date_range: Option<DateRange>,

    /// Quantile level of total cost above which a record is high cost
    pub cost_quantile_threshold: f64,

    /// Stays strictly longer than this many days are long stays
    pub long_stay_days: f64,

    pub risk_weights: RiskWeights,

    /// Abort when rejected / total exceeds this ratio; unset never aborts
    pub rejection_abort_ratio: Option<f64>,

    /// Records with a risk score strictly above this are high risk
    pub high_risk_threshold: f64,

    /// Length of the top-N rankings in the analytics summary
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_range: None,
            cost_quantile_threshold: 0.75,
            long_stay_days: 7.0,
            risk_weights: RiskWeights::default(),
            rejection_abort_ratio: None,
            high_risk_threshold: 0.7,
            top_n: 5,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(q) = parse_override(&lookup, ENV_COST_QUANTILE)? {
            self.cost_quantile_threshold = q;
        }
        if let Some(days) = parse_override(&lookup, ENV_LONG_STAY_DAYS)? {
            self.long_stay_days = days;
        }
        if let Some(ratio) = parse_override(&lookup, ENV_REJECTION_ABORT_RATIO)? {
            self.rejection_abort_ratio = Some(ratio);
        }
        Ok(self)
    }

    /// Check every field against its allowed domain.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.cost_quantile_threshold) {
            return Err(invalid(
                "cost_quantile_threshold",
                format!("must be within [0, 1], got {}", self.cost_quantile_threshold),
            ));
        }
        if !self.long_stay_days.is_finite() || self.long_stay_days <= 0.0 {
            return Err(invalid(
                "long_stay_days",
                format!("must be positive, got {}", self.long_stay_days),
            ));
        }
        if let Some(ratio) = self.rejection_abort_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(
                    "rejection_abort_ratio",
                    format!("must be within [0, 1], got {}", ratio),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.high_risk_threshold) {
            return Err(invalid(
                "high_risk_threshold",
                format!("must be within [0, 1], got {}", self.high_risk_threshold),
            ));
        }
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(invalid(
                    "date_range",
                    format!("start {} is after end {}", range.start, range.end),
                ));
            }
        }
        self.risk_weights.validate()
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

fn parse_override<F>(lookup: &F, var: &str) -> ConfigResult<Option<f64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.cost_quantile_threshold, 0.75);
        assert_eq!(config.long_stay_days, 7.0);
        assert_eq!(config.risk_weights.total(), 9.0);
        assert!(config.rejection_abort_ratio.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{ "long_stay_days": 10, "risk_weights": { "elderly": 1 } }"#,
        )
        .unwrap();
        assert_eq!(config.long_stay_days, 10.0);
        assert_eq!(config.risk_weights.elderly, 1.0);
        assert_eq!(config.risk_weights.emergency, 3.0);
        assert_eq!(config.cost_quantile_threshold, 0.75);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "rejection_abort_ratio": 0.1 }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.rejection_abort_ratio, Some(0.1));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_COST_QUANTILE, "0.9"),
            (ENV_REJECTION_ABORT_RATIO, " 0.25 "),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.cost_quantile_threshold, 0.9);
        assert_eq!(config.rejection_abort_ratio, Some(0.25));
        assert_eq!(config.long_stay_days, 7.0);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let err = PipelineConfig::default()
            .with_overrides(|var| (var == ENV_LONG_STAY_DAYS).then(|| "a week".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_LONG_STAY_DAYS));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PipelineConfig {
            cost_quantile_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            long_stay_days: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            risk_weights: RiskWeights {
                elderly: -1.0,
                ..RiskWeights::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            date_range: Some(DateRange::new(
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            )),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let weights = RiskWeights {
            elderly: 0.0,
            emergency: 0.0,
            readmission: 0.0,
        };
        assert!(weights.validate().is_err());
    }
}
