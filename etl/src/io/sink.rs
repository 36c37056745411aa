//! Sinks for finished runs.
//!
//! ```text
//! <root>/
//! └── 20240315_103000_1a2b3c4d/
//!     ├── conditions.csv
//!     ├── overview.csv
//!     ├── regional.csv
//!     ├── metadata.json
//!     ├── raw.csv          (write_records)
//!     └── processed.csv    (write_records)
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::Sink;
use crate::error::SinkResult;
use crate::extract::ExtractBundle;
use crate::logs::log_info_indent;
use crate::models::{weekday_name, DerivedRecord};
use crate::parser::write_raw_csv;
use crate::transform::{RunMetadata, RunReport};

/// File name of the run metadata inside a run directory.
pub const METADATA_FILE: &str = "metadata.json";
/// Records as extracted, before validation.
pub const RAW_FILE: &str = "raw.csv";
/// Accepted records with every derived feature.
pub const PROCESSED_FILE: &str = "processed.csv";

/// Column order of [`PROCESSED_FILE`].
pub const PROCESSED_COLUMNS: [&str; 19] = [
    "patient_id",
    "admission_date",
    "age",
    "gender",
    "county",
    "condition",
    "admission_type",
    "length_of_stay",
    "total_cost",
    "readmission",
    "age_group",
    "year",
    "month",
    "quarter",
    "day_of_week",
    "cost_per_day",
    "is_long_stay",
    "is_high_cost",
    "risk_score",
];

/// Writes each run into its own timestamped directory under `root`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a run is written to.
    pub fn run_dir(&self, metadata: &RunMetadata) -> PathBuf {
        let run_id = metadata.run_id.simple().to_string();
        self.root.join(format!(
            "{}_{}",
            metadata.extraction_timestamp.format("%Y%m%d_%H%M%S"),
            &run_id[..8]
        ))
    }

    /// Write the raw and processed record sets of a published run into its
    /// run directory.
    pub async fn write_records(&self, report: &RunReport) -> SinkResult<()> {
        let dir = self.run_dir(&report.metadata);
        tokio::fs::create_dir_all(&dir).await?;

        let mut raw = Vec::new();
        write_raw_csv(&report.raw, &mut raw)?;
        let path = dir.join(RAW_FILE);
        tokio::fs::write(&path, raw).await?;
        log_info_indent(format!("wrote {}", path.display()), 1);

        let mut processed = Vec::new();
        write_processed_csv(&report.output.records, &mut processed)?;
        let path = dir.join(PROCESSED_FILE);
        tokio::fs::write(&path, processed).await?;
        log_info_indent(format!("wrote {}", path.display()), 1);
        Ok(())
    }
}

/// Write derived records as CSV with [`PROCESSED_COLUMNS`] headers.
///
/// Missing counties and undefined high-cost flags are empty cells.
pub fn write_processed_csv<W: io::Write>(records: &[DerivedRecord], writer: W) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(PROCESSED_COLUMNS)?;
    for r in records {
        let a = &r.admission;
        csv.write_record([
            a.patient_id.clone(),
            a.admission_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            a.age.to_string(),
            a.gender.to_string(),
            a.county.clone().unwrap_or_default(),
            a.condition.clone(),
            a.admission_type.to_string(),
            a.length_of_stay.to_string(),
            a.total_cost.to_string(),
            u8::from(a.readmission).to_string(),
            r.age_group.label().to_string(),
            r.year.to_string(),
            r.month.to_string(),
            r.quarter.to_string(),
            weekday_name(r.day_of_week).to_string(),
            r.cost_per_day.to_string(),
            r.is_long_stay.to_string(),
            r.is_high_cost.map(|f| f.to_string()).unwrap_or_default(),
            r.risk_score.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

impl Sink for DirectorySink {
    async fn publish(&self, bundle: &ExtractBundle, metadata: &RunMetadata) -> SinkResult<()> {
        let dir = self.run_dir(metadata);
        tokio::fs::create_dir_all(&dir).await?;

        for extract in bundle.extracts() {
            let mut buffer = Vec::new();
            extract.write_csv(&mut buffer)?;
            let path = dir.join(format!("{}.csv", extract.name));
            tokio::fs::write(&path, buffer).await?;
            log_info_indent(format!("wrote {}", path.display()), 1);
        }

        let path = dir.join(METADATA_FILE);
        tokio::fs::write(&path, serde_json::to_vec_pretty(metadata)?).await?;
        log_info_indent(format!("wrote {}", path.display()), 1);
        Ok(())
    }
}

/// Keeps every published run in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<(ExtractBundle, RunMetadata)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, oldest first.
    pub async fn published(&self) -> Vec<(ExtractBundle, RunMetadata)> {
        self.published.lock().await.clone()
    }
}

impl Sink for MemorySink {
    async fn publish(&self, bundle: &ExtractBundle, metadata: &RunMetadata) -> SinkResult<()> {
        self.published
            .lock()
            .await
            .push((bundle.clone(), metadata.clone()));
        Ok(())
    }
}
