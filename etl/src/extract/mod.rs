//! Named, schema-stable extracts for downstream reporting.
//!
//! Three extracts are always published:
//!
//! | Extract      | Grouped by     | Columns                                                      |
//! |--------------|----------------|--------------------------------------------------------------|
//! | `overview`   | year, month    | Year, Month, Admissions, Total_Cost, Avg_LOS, Readmission_Rate |
//! | `conditions` | condition      | Condition, Count, Avg_Cost, Avg_LOS, Readmission_Rate        |
//! | `regional`   | county         | County, Admissions, Total_Cost, Readmission_Rate             |
//!
//! Column names and order never depend on the data. Building an extract is
//! a projection of an [`AggregateTable`]; nothing is recomputed here.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult, SinkResult};
use crate::transform::aggregate::{
    AggregateSpec, AggregateTable, GroupField, KeyValue, Measure, Reduction,
};

/// Version stamped on every extract and its schema.
pub const EXTRACT_VERSION: &str = "1.0";

// =============================================================================
// Definitions
// =============================================================================

/// Fixed layout of one published extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractDefinition {
    pub name: &'static str,
    pub version: &'static str,
    /// Key columns followed by one column per reduction
    pub columns: &'static [&'static str],
    pub keys: &'static [GroupField],
    pub reductions: &'static [Reduction],
}

impl ExtractDefinition {
    pub const OVERVIEW: Self = Self {
        name: "overview",
        version: EXTRACT_VERSION,
        columns: &["Year", "Month", "Admissions", "Total_Cost", "Avg_LOS", "Readmission_Rate"],
        keys: &[GroupField::Year, GroupField::Month],
        reductions: &[
            Reduction::Count,
            Reduction::SumCost,
            Reduction::MeanLengthOfStay,
            Reduction::MeanReadmission,
        ],
    };

    pub const CONDITIONS: Self = Self {
        name: "conditions",
        version: EXTRACT_VERSION,
        columns: &["Condition", "Count", "Avg_Cost", "Avg_LOS", "Readmission_Rate"],
        keys: &[GroupField::Condition],
        reductions: &[
            Reduction::Count,
            Reduction::MeanCost,
            Reduction::MeanLengthOfStay,
            Reduction::MeanReadmission,
        ],
    };

    pub const REGIONAL: Self = Self {
        name: "regional",
        version: EXTRACT_VERSION,
        columns: &["County", "Admissions", "Total_Cost", "Readmission_Rate"],
        keys: &[GroupField::County],
        reductions: &[Reduction::Count, Reduction::SumCost, Reduction::MeanReadmission],
    };

    pub fn spec(&self) -> AggregateSpec {
        AggregateSpec::new(self.keys.to_vec(), self.reductions.to_vec())
    }

    /// Find a required extract by name.
    pub fn by_name(name: &str) -> Option<&'static Self> {
        REQUIRED_EXTRACTS.iter().find(|d| d.name == name)
    }
}

/// Extracts every run must publish.
pub static REQUIRED_EXTRACTS: [ExtractDefinition; 3] = [
    ExtractDefinition::OVERVIEW,
    ExtractDefinition::CONDITIONS,
    ExtractDefinition::REGIONAL,
];

/// Aggregations needed to build every required extract.
pub fn required_specs() -> Vec<(&'static str, AggregateSpec)> {
    REQUIRED_EXTRACTS.iter().map(|d| (d.name, d.spec())).collect()
}

// =============================================================================
// Extract
// =============================================================================

/// A single cell of an extract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&KeyValue> for Cell {
    fn from(key: &KeyValue) -> Self {
        match key {
            KeyValue::Int(v) => Self::Int(*v),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<Measure> for Cell {
    fn from(measure: Measure) -> Self {
        match measure {
            Measure::Count(n) => Self::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            Measure::Real(v) => Self::Float(v),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// An immutable, named table handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extract {
    pub name: String,
    pub version: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Extract {
    /// Write as CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> SinkResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Sum of an integer column, e.g. `Admissions`.
    pub fn column_total(&self, column: &str) -> Option<i64> {
        let index = self.columns.iter().position(|c| c == column)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| match row.get(index) {
                    Some(Cell::Int(v)) => Some(*v),
                    _ => None,
                })
                .sum(),
        )
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// The three required extracts of one run, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractBundle {
    extracts: BTreeMap<String, Extract>,
}

impl ExtractBundle {
    pub fn get(&self, name: &str) -> Option<&Extract> {
        self.extracts.get(name)
    }

    pub fn overview(&self) -> Option<&Extract> {
        self.get(ExtractDefinition::OVERVIEW.name)
    }

    pub fn conditions(&self) -> Option<&Extract> {
        self.get(ExtractDefinition::CONDITIONS.name)
    }

    pub fn regional(&self) -> Option<&Extract> {
        self.get(ExtractDefinition::REGIONAL.name)
    }

    /// Extracts in name order.
    pub fn extracts(&self) -> impl Iterator<Item = &Extract> {
        self.extracts.values()
    }

    pub fn len(&self) -> usize {
        self.extracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extracts.is_empty()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles aggregate tables into an [`ExtractBundle`].
#[derive(Debug, Default)]
pub struct ExtractBuilder {
    tables: BTreeMap<String, AggregateTable>,
}

impl ExtractBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: BTreeMap<String, AggregateTable>) -> Self {
        Self { tables }
    }

    pub fn with_table(mut self, name: impl Into<String>, table: AggregateTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Project every required extract.
    ///
    /// Fails without a partial bundle if any required input is absent.
    pub fn build(&self) -> PipelineResult<ExtractBundle> {
        let extracts = REQUIRED_EXTRACTS
            .iter()
            .map(|definition| {
                let table = self
                    .tables
                    .get(definition.name)
                    .ok_or_else(|| PipelineError::MissingExtract(definition.name.to_string()))?;
                Ok((definition.name.to_string(), project(definition, table)?))
            })
            .collect::<PipelineResult<BTreeMap<_, _>>>()?;

        Ok(ExtractBundle { extracts })
    }
}

fn project(definition: &ExtractDefinition, table: &AggregateTable) -> PipelineResult<Extract> {
    let incompatible = |reason: String| PipelineError::IncompatibleAggregate {
        extract: definition.name.to_string(),
        reason,
    };

    if table.spec.keys != definition.keys {
        return Err(incompatible(format!(
            "grouped by {:?}, expected {:?}",
            table.spec.keys, definition.keys
        )));
    }

    let indices = definition
        .reductions
        .iter()
        .map(|reduction| {
            table
                .measure_index(*reduction)
                .ok_or_else(|| incompatible(format!("missing reduction {reduction:?}")))
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.key
                .iter()
                .map(Cell::from)
                .chain(indices.iter().map(|&i| Cell::from(row.measures[i])))
                .collect()
        })
        .collect();

    Ok(Extract {
        name: definition.name.to_string(),
        version: definition.version.to_string(),
        columns: definition.columns.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}
