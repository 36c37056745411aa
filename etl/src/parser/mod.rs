//! Admissions CSV reader with encoding and delimiter auto-detection.
//!
//! Each row becomes a [`RawRecord`]. Cells that cannot be read as their
//! column's type are kept as text in `unparsed_fields` and columns outside
//! the admission schema in `extra_fields`; rejecting them is validation's
//! job, not the parser's.

use std::io::Write;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{SourceError, SourceResult};
use crate::models::RawRecord;

/// Accepted timestamp layouts, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Accepted date-only layouts; the time is midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Column order used when writing raw records.
pub const RAW_COLUMNS: [&str; 10] = [
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
];

/// Parsed file with detection metadata
#[derive(Debug, Clone)]
pub struct ParsedAdmissions {
    pub records: Vec<RawRecord>,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers as found in the file
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "utf-8-sig" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SourceResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| SourceError::Encoding(e.to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(decoder) => Ok(decoder.decode(bytes).0.into_owned()),
            None => Ok(String::from_utf8_lossy(bytes).into_owned()),
        },
    }
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

/// Known admission columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    PatientId,
    AdmissionDate,
    Age,
    Gender,
    County,
    Condition,
    AdmissionType,
    LengthOfStay,
    TotalCost,
    Readmission,
}

impl Column {
    /// Map a header to a column; case, spaces and dashes are ignored.
    fn from_header(header: &str) -> Option<Self> {
        let normalized: String = header
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "patient_id" | "patientid" | "patient" => Some(Self::PatientId),
            "admission_date" | "record_date" | "admission_timestamp" | "date" => {
                Some(Self::AdmissionDate)
            }
            "age" => Some(Self::Age),
            "gender" | "sex" => Some(Self::Gender),
            "county" => Some(Self::County),
            "condition" | "diagnosis" => Some(Self::Condition),
            "admission_type" | "type" => Some(Self::AdmissionType),
            "length_of_stay" | "los" => Some(Self::LengthOfStay),
            "total_cost" | "cost" => Some(Self::TotalCost),
            "readmission" | "readmitted" => Some(Self::Readmission),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        RAW_COLUMNS[self as usize]
    }
}

/// Parse a timestamp in any accepted layout.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a readmission flag.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "t" => Some(true),
        "0" | "false" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

fn parse_age(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok()
}

/// Parse a typed cell, keeping the text in `unparsed_fields` on failure.
fn parse_cell<T>(
    record: &mut RawRecord,
    column: Column,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        record
            .unparsed_fields
            .insert(column.name().to_string(), value.to_string());
    }
    parsed
}

fn build_record(columns: &[Option<Column>], headers: &[String], row: &csv::StringRecord) -> RawRecord {
    let mut record = RawRecord::default();

    for (i, value) in row.iter().enumerate() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let Some(column) = columns.get(i).copied().flatten() else {
            let header = headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i + 1));
            record.extra_fields.insert(header, value.to_string());
            continue;
        };

        match column {
            Column::PatientId => record.patient_id = value.to_string(),
            Column::Gender => record.gender = Some(value.to_string()),
            Column::County => record.county = Some(value.to_string()),
            Column::Condition => record.condition = Some(value.to_string()),
            Column::AdmissionType => record.admission_type = Some(value.to_string()),
            Column::AdmissionDate => {
                record.admission_date = parse_cell(&mut record, column, value, parse_timestamp);
            }
            Column::Age => {
                record.age = parse_cell(&mut record, column, value, parse_age);
            }
            Column::LengthOfStay => {
                record.length_of_stay = parse_cell(&mut record, column, value, parse_number);
            }
            Column::TotalCost => {
                record.total_cost = parse_cell(&mut record, column, value, parse_number);
            }
            Column::Readmission => {
                record.readmission = parse_cell(&mut record, column, value, parse_flag);
            }
        }
    }

    record
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// Blank lines are skipped. A `patient_id` column is mandatory.
pub fn parse_admissions(content: &str, delimiter: char) -> SourceResult<(Vec<String>, Vec<RawRecord>)> {
    if content.trim().is_empty() {
        return Err(SourceError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let columns: Vec<Option<Column>> = headers.iter().map(|h| Column::from_header(h)).collect();

    if !columns.contains(&Some(Column::PatientId)) {
        return Err(SourceError::MissingColumn(Column::PatientId.name().to_string()));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(build_record(&columns, &headers, &row));
    }

    Ok((headers, records))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> SourceResult<ParsedAdmissions> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let (headers, records) = parse_admissions(&content, delimiter)?;

    Ok(ParsedAdmissions {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto(path: impl AsRef<Path>) -> SourceResult<ParsedAdmissions> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Write raw records as comma-separated CSV with [`RAW_COLUMNS`] headers.
///
/// Extra and unparsed fields are not written.
pub fn write_raw_csv<W: Write>(records: &[RawRecord], writer: W) -> csv::Result<()> {
    fn opt<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RAW_COLUMNS)?;
    for r in records {
        csv.write_record([
            r.patient_id.clone(),
            r.admission_date
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            opt(&r.age),
            opt(&r.gender),
            opt(&r.county),
            opt(&r.condition),
            opt(&r.admission_type),
            opt(&r.length_of_stay),
            opt(&r.total_cost),
            r.readmission.map(|b| u8::from(b).to_string()).unwrap_or_default(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}
