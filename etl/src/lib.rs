//! # healthetl - Health admission transform-and-aggregate engine
//!
//! healthetl turns raw health admission records into analysis-ready
//! datasets: validated records with derived features and a risk score, plus
//! the `overview`, `conditions` and `regional` extracts for reporting tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │ Extractor │──▶│ Validate │──▶│ Phase 1  │──▶│ Statistics │──▶│ Phase 2 + │──▶│ Aggregate│──▶ Sink
//! │ (CSV/seed)│   │          │   │ features │   │ (barrier)  │   │ risk      │   │ extracts │
//! └───────────┘   └──────────┘   └──────────┘   └────────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use healthetl::io::{MemorySink, SyntheticExtractor};
//! use healthetl::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//!     let report = pipeline
//!         .run(&SyntheticExtractor::new(10_000, 42), &MemorySink::new())
//!         .await
//!         .unwrap();
//!     println!("{} records", report.metadata.record_count);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Run configuration (JSON file + environment)
//! - [`models`] - Raw, validated and derived records
//! - [`parser`] - CSV parsing with auto-detection
//! - [`validation`] - Record checks and extract schema checks
//! - [`transform`] - Features, statistics, risk, aggregation and the pipeline
//! - [`extract`] - Schema-stable extract tables
//! - [`summary`] - Key metrics, rankings and the high-risk cohort
//! - [`io`] - Extractors and sinks
//! - [`logs`] - Broadcast progress log

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod extract;
pub mod summary;
pub mod transform;

// Collaborators
pub mod io;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ExtractSchemaError, PipelineError, PipelineResult, SinkError, SourceError,
    StatisticError, ValidationError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{PipelineConfig, RiskWeights};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AdmissionRecord, AdmissionType, AgeGroup, DateRange, DerivedRecord, Gender, RawRecord,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_bundle, RecordValidator, Rejection, ValidationOutcome};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto,
    write_raw_csv, ParsedAdmissions,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    aggregate, aggregate_many, AbortSignal, AggregateSpec, AggregateTable, DatasetStatistics,
    FeatureDeriver, GroupField, Phase1Record, Pipeline, Reduction, RiskScorer, RunMetadata,
    RunReport, TransformOutput,
};

// =============================================================================
// Re-exports - Extracts and Summary
// =============================================================================

pub use extract::{Extract, ExtractBuilder, ExtractBundle, ExtractDefinition, REQUIRED_EXTRACTS};
pub use summary::{AnalyticsSummarizer, AnalyticsSummary, KeyMetrics, RankedEntry};

// =============================================================================
// Re-exports - I/O
// =============================================================================

pub use io::{CsvExtractor, DirectorySink, Extractor, MemorySink, Sink, SyntheticExtractor};
