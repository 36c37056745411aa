//! healthetl CLI - Transform admission records into reporting extracts
//!
//! # Main Commands
//!
//! ```bash
//! healthetl run admissions.csv -o out       # Full run, extracts written to out/
//! healthetl run --synthetic 10000 -o out    # Same, on seeded synthetic data
//! healthetl summary admissions.csv          # Key metrics, rankings, high-risk cohort
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! healthetl validate admissions.csv         # Accepted / rejected counts
//! healthetl generate -n 500 -o sample.csv   # Write synthetic raw records
//! healthetl schema overview                 # Show an extract's JSON schema
//! healthetl example-config                  # Show the default configuration
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use healthetl::logs::LOG_BROADCASTER;
use healthetl::validation::schema::schema_for;
use healthetl::{
    parse_file_auto, write_raw_csv, AnalyticsSummary, CsvExtractor, DateRange, DirectorySink,
    Pipeline, PipelineConfig, RecordValidator, RunMetadata, SyntheticExtractor, REQUIRED_EXTRACTS,
};

#[derive(Parser)]
#[command(name = "healthetl")]
#[command(about = "Transform health admission records into analysis-ready extracts", long_about = None)]
struct Cli {
    /// Do not echo progress to stdout
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: extract, transform, write extracts
    Run {
        /// Input CSV file
        #[arg(required_unless_present = "synthetic")]
        input: Option<PathBuf>,

        /// Generate this many synthetic records instead of reading a file
        #[arg(long, conflicts_with = "input")]
        synthetic: Option<usize>,

        /// Seed for synthetic records
        #[arg(long, default_value_t = SyntheticExtractor::DEFAULT_SEED)]
        seed: u64,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// First admission date to include (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last admission date to include (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a CSV file and report rejected records
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// Number of rejections to list
        #[arg(long, default_value = "10")]
        show: usize,
    },

    /// Print analytics for a CSV file without writing extracts
    Summary {
        /// Input CSV file
        input: PathBuf,

        /// Configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write synthetic raw records as CSV
    Generate {
        /// Number of records
        #[arg(short = 'n', long, default_value = "10000")]
        count: usize,

        /// Generator seed
        #[arg(long, default_value_t = SyntheticExtractor::DEFAULT_SEED)]
        seed: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show extract schemas
    Schema {
        /// Extract name (default: list all extracts and their columns)
        name: Option<String>,
    },

    /// Show the default configuration
    ExampleConfig,
}

impl Commands {
    /// Whether stdout carries a JSON document that progress echo would corrupt.
    fn prints_json(&self) -> bool {
        matches!(
            self,
            Commands::Run { json: true, .. } | Commands::Summary { json: true, .. }
        )
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet || cli.command.prints_json() {
        LOG_BROADCASTER.set_echo(false);
    }

    let result = match cli.command {
        Commands::Run {
            input,
            synthetic,
            seed,
            output,
            config,
            from,
            to,
            json,
        } => {
            let range = from.zip(to).map(|(start, end)| DateRange::new(start, end));
            cmd_run(input.as_deref(), synthetic, seed, &output, config.as_deref(), range, json).await
        }

        Commands::Validate { input, show } => cmd_validate(&input, show),

        Commands::Summary {
            input,
            config,
            json,
        } => cmd_summary(&input, config.as_deref(), json),

        Commands::Generate {
            count,
            seed,
            output,
        } => cmd_generate(count, seed, output.as_deref()),

        Commands::Schema { name } => cmd_schema(name.as_deref()),

        Commands::ExampleConfig => cmd_example_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Default configuration, then the file, then the environment.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

async fn cmd_run(
    input: Option<&Path>,
    synthetic: Option<usize>,
    seed: u64,
    output: &Path,
    config_path: Option<&Path>,
    range: Option<DateRange>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if range.is_some() {
        config.date_range = range;
    }

    let pipeline = Pipeline::new(config)?;
    let sink = DirectorySink::new(output);

    let report = match (input, synthetic) {
        (Some(path), _) => pipeline.run(&CsvExtractor::new(path), &sink).await?,
        (None, Some(count)) => {
            pipeline
                .run(&SyntheticExtractor::new(count, seed), &sink)
                .await?
        }
        (None, None) => return Err("an input file or --synthetic is required".into()),
    };

    sink.write_records(&report).await?;
    eprintln!(
        "💾 Extracts and records written to: {}",
        sink.run_dir(&report.metadata).display()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report.output.summary)?);
    } else {
        print_summary(&report.output.summary, Some(&report.metadata));
    }
    Ok(())
}

fn cmd_validate(input: &Path, show: usize) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let parsed = parse_file_auto(input)?;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("   Columns: {}", parsed.headers.join(", "));

    let outcome = RecordValidator::new().validate_batch(&parsed.records);
    for rejection in outcome.rejections.iter().take(show) {
        eprintln!(
            "❌ Record {} ({}): {}",
            rejection.index, rejection.patient_id, rejection.reason
        );
    }

    eprintln!(
        "\n📊 Results: {} valid, {} invalid ({:.1}%)",
        outcome.accepted.len(),
        outcome.rejections.len(),
        outcome.rejection_ratio() * 100.0
    );

    if !outcome.rejections.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_summary(
    input: &Path,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(load_config(config_path)?)?;
    let parsed = parse_file_auto(input)?;
    let output = pipeline.transform(&parsed.records)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output.summary)?);
    } else {
        print_summary(&output.summary, None);
    }
    Ok(())
}

fn cmd_generate(
    count: usize,
    seed: u64,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = SyntheticExtractor::new(count, seed).generate()?;
    match output {
        Some(p) => {
            write_raw_csv(&records, fs::File::create(p)?)?;
            eprintln!("💾 {} records written to: {}", records.len(), p.display());
        }
        None => write_raw_csv(&records, std::io::stdout().lock())?,
    }
    Ok(())
}

fn cmd_schema(name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    match name {
        Some(name) => {
            let schema = schema_for(name).ok_or_else(|| format!("Unknown extract: {}", name))?;
            println!("{}", serde_json::to_string_pretty(schema)?);
        }
        None => {
            for definition in &REQUIRED_EXTRACTS {
                println!("📄 {} (v{})", definition.name, definition.version);
                println!("   {}", definition.columns.join(", "));
            }
        }
    }
    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn print_summary(summary: &AnalyticsSummary, metadata: Option<&RunMetadata>) {
    let m = &summary.metrics;

    println!("\n{}", "=".repeat(60));
    println!("ANALYTICS SUMMARY");
    println!("{}", "=".repeat(60));

    if let Some(meta) = metadata {
        println!("Run: {}", meta.run_id);
        println!(
            "Records: {} accepted, {} rejected",
            meta.record_count, meta.rejection_count
        );
        match meta.cost_threshold {
            Some(t) => println!("High-cost threshold: ${:.2}", t),
            None => println!("High-cost threshold: undefined"),
        }
    }

    println!("\nKEY METRICS:");
    println!("Total Patients: {}", m.unique_patients);
    println!("Total Admissions: {}", m.total_admissions);
    println!("Avg Length of Stay: {:.1} days", m.avg_length_of_stay);
    println!("Avg Total Cost: ${:.2}", m.avg_cost);
    println!("Readmission Rate: {:.1}%", m.readmission_rate * 100.0);

    println!("\nTOP {} CONDITIONS:", summary.top_conditions.len());
    for (i, entry) in summary.top_conditions.iter().enumerate() {
        println!(
            "  {}. {}: {} ({:.1}%)",
            i + 1,
            entry.key,
            entry.count,
            entry.share * 100.0
        );
    }

    println!("\nDEMOGRAPHICS:");
    println!("Average Age: {:.1} years", m.avg_age);
    let genders: Vec<String> = m
        .gender_distribution
        .iter()
        .map(|(gender, count)| format!("{} {}", count, gender))
        .collect();
    println!("Gender: {}", genders.join(", "));

    println!("\nTOP {} COUNTIES BY ADMISSIONS:", summary.top_counties.len());
    for (i, entry) in summary.top_counties.iter().enumerate() {
        println!("  {}. {}: {}", i + 1, entry.key, entry.count);
    }

    println!(
        "\nHigh-Risk Patients (risk > {}): {} ({:.1}%)",
        summary.high_risk.threshold,
        summary.high_risk.len(),
        summary.high_risk.proportion * 100.0
    );
}
