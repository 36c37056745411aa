//! Collaborators at the edges of the pipeline.
//!
//! - [`Extractor`]: produces the raw record set for a run
//! - [`Sink`]: receives the finished extract bundle and run metadata
//!
//! All blocking I/O lives behind these two traits; the pipeline awaits the
//! extractor before the first stage and the sink after the last one.

pub mod csv_source;
pub mod sink;
pub mod synthetic;

pub use csv_source::CsvExtractor;
pub use sink::{write_processed_csv, DirectorySink, MemorySink};
pub use synthetic::SyntheticExtractor;

use crate::error::{SinkResult, SourceResult};
use crate::extract::ExtractBundle;
use crate::models::{DateRange, RawRecord};
use crate::transform::RunMetadata;

/// Source of raw admission records.
#[allow(async_fn_in_trait)]
pub trait Extractor {
    /// Every record admitted within `range`, or all records if `None`.
    async fn extract(&self, range: Option<&DateRange>) -> SourceResult<Vec<RawRecord>>;
}

/// Destination of a run's extracts.
#[allow(async_fn_in_trait)]
pub trait Sink {
    async fn publish(&self, bundle: &ExtractBundle, metadata: &RunMetadata) -> SinkResult<()>;
}
