//! Transformation module.
//!
//! This module handles the transform-and-aggregate core:
//! - Features: per-record derivation in two phases
//! - Statistics: dataset-wide quantile threshold (the one barrier)
//! - Risk: weighted per-record risk score
//! - Aggregate: grouped reductions with deterministic ordering
//! - Pipeline: stage sequencing and the run entry point

pub mod aggregate;
pub mod features;
pub mod pipeline;
pub mod risk;
pub mod statistics;

pub use aggregate::{
    aggregate, aggregate_many, is_unknown_label, AggregateRow, AggregateSpec, AggregateTable, GroupField, KeyValue,
    Measure, Reduction,
};
pub use features::{CalendarFields, FeatureDeriver, Phase1Record};
pub use pipeline::{AbortSignal, Pipeline, RunMetadata, RunReport, TransformOutput};
pub use risk::{RiskScorer, ELDERLY_AGE};
pub use statistics::{quantile, quantile_sorted, DatasetStatistics, MIN_QUANTILE_SAMPLE};
