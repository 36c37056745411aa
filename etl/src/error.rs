//! Error types for the healthetl pipeline.
//!
//! - [`ValidationError`] - Per-record rejection reasons (recoverable)
//! - [`StatisticError`] - Dataset statistic could not be computed (recoverable)
//! - [`ConfigError`] - Invalid or unreadable configuration
//! - [`SourceError`] - Failures of an `Extractor` collaborator
//! - [`SinkError`] - Failures of a `Sink` collaborator
//! - [`ExtractSchemaError`] - An extract does not match its published schema
//! - [`PipelineError`] - Top-level, run-aborting errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Record Validation Errors
// =============================================================================

/// Why a single raw record was rejected.
///
/// These never abort a run on their own; the orchestrator counts them and
/// only escalates once the configured rejection ratio is exceeded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field was absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A required text field was present but blank.
    #[error("field '{0}' is empty")]
    EmptyValue(&'static str),

    /// The source delivered a value that could not be read as the field's type.
    #[error("field '{field}' has malformed value '{value}'")]
    Malformed { field: String, value: String },

    /// Age outside the accepted 0-120 range.
    #[error("age {0} is outside 0-120")]
    AgeOutOfRange(i64),

    /// Length of stay must be strictly positive before cost-per-day is derived.
    #[error("length of stay must be positive, got {0}")]
    DivisionGuard(f64),

    /// Total cost must be finite and non-negative.
    #[error("total cost must be a non-negative number, got {0}")]
    InvalidCost(f64),

    /// Total cost above the accepted ceiling; sums over such values overflow.
    #[error("total cost {0} exceeds the maximum of {max}", max = crate::validation::MAX_TOTAL_COST)]
    CostTooLarge(f64),

    /// Cost per day is not a finite number.
    #[error("cost per day of {total_cost} over {length_of_stay} day(s) is not finite")]
    CostPerDayOverflow { total_cost: f64, length_of_stay: f64 },

    /// The record carried a column outside the admission schema.
    #[error("unexpected field '{0}'")]
    UnexpectedField(String),
}

// =============================================================================
// Statistic Errors
// =============================================================================

/// A dataset-wide statistic could not be computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatisticError {
    /// Too few observations for a quantile.
    #[error("statistic undefined: {available} value(s) available, at least {required} required")]
    Undefined { available: usize, required: usize },

    /// Quantile level outside [0, 1].
    #[error("quantile level {0} is outside [0, 1]")]
    InvalidLevel(f64),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading or checking a [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the config shape.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for environment variable {var}")]
    Env { var: String, value: String },

    /// A field holds a value outside its allowed domain.
    #[error("invalid config field '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Errors raised by an `Extractor`.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read the source.
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Could not decode the source bytes.
    #[error("failed to decode source: {0}")]
    Encoding(String),

    /// The source had no header row.
    #[error("source is empty")]
    EmptyFile,

    /// A mandatory column is absent from the header.
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// The synthetic generator was configured with impossible parameters.
    #[error("generator error: {0}")]
    Generator(String),
}

/// Errors raised by a `Sink`.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to write output.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize metadata.
    #[error("failed to serialize metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to write CSV.
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

// =============================================================================
// Extract Schema Errors
// =============================================================================

/// An extract failed its embedded JSON schema check.
#[derive(Debug, Error)]
#[error("extract '{extract}' does not match its schema: {errors:?}")]
pub struct ExtractSchemaError {
    pub extract: String,
    pub errors: Vec<String>,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Fatal errors: the run stops and no extract reaches the sink.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Extractor failure.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Sink failure.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Extract schema mismatch.
    #[error(transparent)]
    Schema(#[from] ExtractSchemaError),

    /// A record reached feature derivation without passing validation.
    #[error("unvalidated record reached derivation: {0}")]
    Validation(#[from] ValidationError),

    /// A dataset statistic could not be computed.
    #[error("statistic error: {0}")]
    Statistic(#[from] StatisticError),

    /// The extractor produced no records.
    #[error("no records to transform")]
    EmptyInput,

    /// Every record was rejected.
    #[error("all {0} records failed validation")]
    AllRejected(usize),

    /// Too many records were rejected.
    #[error("rejected {rejected} of {total} records ({ratio:.3}), above the abort ratio {limit:.3}")]
    RejectionThresholdExceeded {
        rejected: usize,
        total: usize,
        ratio: f64,
        limit: f64,
    },

    /// A required extract had no aggregate input.
    #[error("missing input for required extract '{0}'")]
    MissingExtract(String),

    /// An aggregate table cannot be projected onto an extract's columns.
    #[error("aggregate for extract '{extract}' is incompatible: {reason}")]
    IncompatibleAggregate { extract: String, reason: String },

    /// The run-level abort signal was raised.
    #[error("run aborted before {0}")]
    Aborted(&'static str),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for per-record validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for extractor operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
