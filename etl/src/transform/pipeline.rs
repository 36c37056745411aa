//! Run orchestration.
//!
//! Sequences the stages of one run and enforces the statistic-before-flag
//! dependency:
//!
//! ```text
//! Extractor ─▶ validate ─▶ derive (phase 1) ─▶ statistics ─▶ finalize (phase 2)
//!                                                                  │
//!                Sink ◀─ schema check ◀─ extracts ◀─ aggregate ◀───┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use healthetl::io::{CsvExtractor, DirectorySink};
//! use healthetl::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig::default())?;
//!     let report = pipeline
//!         .run(&CsvExtractor::new("admissions.csv"), &DirectorySink::new("out"))
//!         .await?;
//!
//!     println!("{} records, {} rejected", report.metadata.record_count, report.metadata.rejection_count);
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::aggregate::aggregate_many;
use super::features::FeatureDeriver;
use super::risk::RiskScorer;
use super::statistics::DatasetStatistics;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{required_specs, ExtractBuilder, ExtractBundle};
use crate::io::{Extractor, Sink};
use crate::logs::{log_error, log_info, log_success, log_warning, log_warning_indent};
use crate::models::{DateRange, DerivedRecord, RawRecord};
use crate::summary::{AnalyticsSummarizer, AnalyticsSummary};
use crate::validation::{validate_bundle, RecordValidator, Rejection};

/// How many rejections are logged individually.
const LOGGED_REJECTIONS: usize = 5;

/// Run-level cancellation flag, checked between stages.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Metadata handed to the sink with every bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub extraction_timestamp: DateTime<Utc>,
    /// Accepted records
    pub record_count: usize,
    pub rejection_count: usize,
    pub cost_quantile: f64,
    /// `None` when the dataset was too small for a threshold
    pub cost_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl RunMetadata {
    fn new(
        extraction_timestamp: DateTime<Utc>,
        output: &TransformOutput,
        date_range: Option<DateRange>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            extraction_timestamp,
            record_count: output.records.len(),
            rejection_count: output.rejections.len(),
            cost_quantile: output.statistics.cost_quantile(),
            cost_threshold: output.statistics.cost_threshold(),
            date_range,
        }
    }
}

/// Everything the core produces from one raw record set.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub records: Vec<DerivedRecord>,
    pub rejections: Vec<Rejection>,
    pub statistics: DatasetStatistics,
    pub bundle: ExtractBundle,
    pub summary: AnalyticsSummary,
}

/// Result of a published run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metadata: RunMetadata,
    /// Records as delivered by the extractor
    pub raw: Vec<RawRecord>,
    pub output: TransformOutput,
}

/// Sequences validation, derivation, statistics, aggregation and publishing.
///
/// Holds only configuration; every run starts from scratch.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    validator: RecordValidator,
    deriver: FeatureDeriver,
    scorer: RiskScorer,
    summarizer: AnalyticsSummarizer,
    abort: AbortSignal,
}

impl Pipeline {
    /// Build a pipeline from a checked configuration.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let scorer = RiskScorer::new(config.risk_weights)?;
        Ok(Self {
            validator: RecordValidator::new(),
            deriver: FeatureDeriver::from_config(&config),
            summarizer: AnalyticsSummarizer::from_config(&config),
            scorer,
            config,
            abort: AbortSignal::new(),
        })
    }

    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    fn checkpoint(&self, stage: &'static str) -> PipelineResult<()> {
        if self.abort.is_aborted() {
            log_warning(format!("Run aborted before {stage}"));
            return Err(PipelineError::Aborted(stage));
        }
        Ok(())
    }

    /// Run the core stages over an already extracted record set.
    ///
    /// Performs no I/O. Fails without producing any extract on empty input,
    /// when every record is rejected, or when the rejection ratio exceeds the
    /// configured limit.
    pub fn transform(&self, raw: &[RawRecord]) -> PipelineResult<TransformOutput> {
        self.checkpoint("validation")?;
        if raw.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        log_info(format!("🔍 Validating {} records...", raw.len()));
        let outcome = self.validator.validate_batch(raw);
        let total = outcome.total();
        let rejected = outcome.rejections.len();

        if rejected > 0 {
            log_warning(format!("{rejected} of {total} records rejected"));
            for rejection in outcome.rejections.iter().take(LOGGED_REJECTIONS) {
                log_warning_indent(
                    format!(
                        "#{} ({}): {}",
                        rejection.index, rejection.patient_id, rejection.reason
                    ),
                    1,
                );
            }
        } else {
            log_success(format!("All {total} records valid"));
        }

        if let Some(limit) = self.config.rejection_abort_ratio {
            let ratio = outcome.rejection_ratio();
            if ratio > limit {
                log_error(format!(
                    "Rejection ratio {ratio:.3} exceeds the abort ratio {limit:.3}"
                ));
                return Err(PipelineError::RejectionThresholdExceeded {
                    rejected,
                    total,
                    ratio,
                    limit,
                });
            }
        }
        if outcome.accepted.is_empty() {
            log_error(format!("No valid records among {total}"));
            return Err(PipelineError::AllRejected(total));
        }

        self.checkpoint("feature derivation")?;
        log_info("⚙️  Deriving features...");
        let phase1 = self.deriver.derive_all(outcome.accepted)?;

        self.checkpoint("statistics")?;
        let statistics = DatasetStatistics::compute(&phase1, self.config.cost_quantile_threshold)?;
        match statistics.cost_threshold() {
            Some(threshold) => log_success(format!(
                "High-cost threshold (q={}): {threshold:.2}",
                statistics.cost_quantile()
            )),
            None => log_warning(format!(
                "High-cost threshold undefined for {} record(s); flag left unset",
                statistics.sample_size()
            )),
        }

        self.checkpoint("risk scoring")?;
        let records = FeatureDeriver::finalize_all(phase1, &statistics, &self.scorer);

        self.checkpoint("aggregation")?;
        log_info("📦 Aggregating extracts...");
        let tables = aggregate_many(&records, &required_specs());
        let bundle = ExtractBuilder::from_tables(tables).build()?;
        validate_bundle(&bundle)?;
        for extract in bundle.extracts() {
            log_success(format!("{}: {} rows", extract.name, extract.rows.len()));
        }

        let summary = self.summarizer.summarize(&records);

        Ok(TransformOutput {
            records,
            rejections: outcome.rejections,
            statistics,
            bundle,
            summary,
        })
    }

    /// Extract, transform and publish one run.
    ///
    /// The sink is only invoked after every stage succeeded.
    pub async fn run<E, S>(&self, extractor: &E, sink: &S) -> PipelineResult<RunReport>
    where
        E: Extractor,
        S: Sink,
    {
        self.checkpoint("extraction")?;
        let extraction_timestamp = Utc::now();
        log_info("📥 Extracting admissions...");
        let raw = extractor.extract(self.config.date_range.as_ref()).await?;
        log_success(format!("Extracted {} records", raw.len()));

        let output = self.transform(&raw)?;

        self.checkpoint("publishing")?;
        let metadata = RunMetadata::new(extraction_timestamp, &output, self.config.date_range);
        sink.publish(&output.bundle, &metadata).await?;
        log_success(format!("Published run {}", metadata.run_id));

        Ok(RunReport {
            metadata,
            raw,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceResult;
    use crate::io::MemorySink;
    use crate::models::fixtures::raw;

    struct VecExtractor(Vec<RawRecord>);

    impl Extractor for VecExtractor {
        async fn extract(&self, _range: Option<&DateRange>) -> SourceResult<Vec<RawRecord>> {
            Ok(self.0.clone())
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).unwrap()
    }

    fn records(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| raw(&format!("P{i}"), 100.0 * (i + 1) as f64))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_input_never_reaches_sink() {
        let sink = MemorySink::new();
        let result = pipeline().run(&VecExtractor(vec![]), &sink).await;

        assert!(matches!(result, Err(PipelineError::EmptyInput)));
        assert!(sink.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_length_of_stay_is_rejected() {
        let mut input = records(4);
        let mut bad = raw("BAD", 5000.0);
        bad.length_of_stay = Some(0.0);
        input.push(bad);

        let sink = MemorySink::new();
        let report = pipeline().run(&VecExtractor(input), &sink).await.unwrap();

        assert_eq!(report.metadata.record_count, 4);
        assert_eq!(report.metadata.rejection_count, 1);
        assert_eq!(report.output.rejections[0].patient_id, "BAD");
        assert!(report
            .output
            .records
            .iter()
            .all(|r| r.admission.patient_id != "BAD"));

        let published = sink.published().await;
        assert_eq!(published.len(), 1);
        let (bundle, metadata) = &published[0];
        assert_eq!(metadata, &report.metadata);
        assert_eq!(bundle.conditions().unwrap().column_total("Count"), Some(4));
        assert_eq!(bundle.overview().unwrap().column_total("Admissions"), Some(4));
    }

    #[tokio::test]
    async fn test_metadata_carries_threshold() {
        let sink = MemorySink::new();
        let report = pipeline().run(&VecExtractor(records(4)), &sink).await.unwrap();

        // costs 100, 200, 300, 400
        assert_eq!(report.metadata.cost_threshold, Some(325.0));
        assert_eq!(report.metadata.cost_quantile, 0.75);
        let high: Vec<_> = report
            .output
            .records
            .iter()
            .filter(|r| r.is_high_cost == Some(true))
            .map(|r| r.admission.patient_id.as_str())
            .collect();
        assert_eq!(high, vec!["P3"]);
    }

    #[tokio::test]
    async fn test_abort_before_run() {
        let signal = AbortSignal::new();
        let pipeline = pipeline().with_abort_signal(signal.clone());
        signal.abort();

        let sink = MemorySink::new();
        let result = pipeline.run(&VecExtractor(records(3)), &sink).await;
        assert!(matches!(result, Err(PipelineError::Aborted("extraction"))));
        assert!(sink.published().await.is_empty());
    }

    #[test]
    fn test_rejection_ratio_limit() {
        let config = PipelineConfig {
            rejection_abort_ratio: Some(0.1),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();

        let mut input = records(4);
        let mut bad = raw("BAD", 100.0);
        bad.age = Some(130);
        input.push(bad);

        match pipeline.transform(&input) {
            Err(PipelineError::RejectionThresholdExceeded { rejected, total, .. }) => {
                assert_eq!((rejected, total), (1, 5));
            }
            other => panic!("expected threshold error, got {other:?}"),
        }
    }

    #[test]
    fn test_ratio_at_limit_passes() {
        let config = PipelineConfig {
            rejection_abort_ratio: Some(0.2),
            ..PipelineConfig::default()
        };
        let mut input = records(4);
        input.push(RawRecord {
            patient_id: "EMPTY".into(),
            ..RawRecord::default()
        });

        let output = Pipeline::new(config).unwrap().transform(&input).unwrap();
        assert_eq!(output.rejections.len(), 1);
    }

    #[test]
    fn test_all_rejected_is_fatal() {
        let mut bad = raw("BAD", 100.0);
        bad.total_cost = Some(-1.0);
        assert!(matches!(
            pipeline().transform(&[bad]),
            Err(PipelineError::AllRejected(1))
        ));
    }

    #[test]
    fn test_overflowing_costs_are_rejected_not_published() {
        let mut input = records(3);
        input.push(raw("HUGE1", 1.5e308));
        input.push(raw("HUGE2", 1.5e308));

        let output = pipeline().transform(&input).unwrap();
        assert_eq!(output.records.len(), 3);
        assert_eq!(output.rejections.len(), 2);
        assert!(validate_bundle(&output.bundle).is_ok());
        for extract in output.bundle.extracts() {
            let json = serde_json::to_value(extract).unwrap();
            assert!(!json.to_string().contains("null"), "{}", extract.name);
        }
    }

    #[test]
    fn test_single_record_run() {
        let mut only = raw("P1", 900.0);
        only.age = Some(70);
        only.admission_type = Some("emergency".into());
        only.readmission = Some(true);

        let output = pipeline().transform(&[only]).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].risk_score, 1.0);
        assert_eq!(output.records[0].is_high_cost, None);
        assert_eq!(output.statistics.cost_threshold(), None);
        assert_eq!(output.summary.high_risk.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            cost_quantile_threshold: 2.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let input = records(20);
        let first = pipeline().transform(&input).unwrap();
        let second = pipeline().transform(&input).unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.bundle, second.bundle);
    }
}
