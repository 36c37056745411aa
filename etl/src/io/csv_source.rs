//! CSV file extractor.

use std::path::{Path, PathBuf};

use super::Extractor;
use crate::error::SourceResult;
use crate::logs::{log_info, log_success};
use crate::models::{DateRange, RawRecord};
use crate::parser::parse_bytes_auto;

/// Reads admissions from a CSV file, detecting encoding and delimiter.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    path: PathBuf,
}

impl CsvExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Extractor for CsvExtractor {
    /// Records without a readable admission date are kept so that
    /// validation can count them.
    async fn extract(&self, range: Option<&DateRange>) -> SourceResult<Vec<RawRecord>> {
        log_info(format!("📖 Reading {}...", self.path.display()));
        let bytes = tokio::fs::read(&self.path).await?;
        let parsed = parse_bytes_auto(&bytes)?;
        log_success(format!(
            "Detected encoding {} and separator '{}'",
            parsed.encoding,
            format_delimiter(parsed.delimiter)
        ));

        let records = match range {
            Some(range) => parsed
                .records
                .into_iter()
                .filter(|r| r.admission_date.map_or(true, |d| range.contains(&d)))
                .collect(),
            None => parsed.records,
        };
        Ok(records)
    }
}

fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}
