//! Validation.
//!
//! - [`record`]: raw admission checks and normalization at ingestion
//! - [`schema`]: JSON Schema (Draft 7) checks of published extracts
//!
//! # Example
//!
//! ```rust,ignore
//! use healthetl::validation::RecordValidator;
//!
//! let outcome = RecordValidator::new().validate_batch(&raw_records);
//! println!("{} accepted, {} rejected", outcome.accepted.len(), outcome.rejections.len());
//! ```

pub mod record;
pub mod schema;

pub use record::{
    normalize_text, RecordValidator, Rejection, ValidationOutcome, MAX_AGE, MAX_TOTAL_COST,
};
pub use schema::{validate, validate_bundle, validate_extract};
