//! JSON Schema checks for published extracts.
//!
//! Each required extract has a versioned, embedded JSON Schema (Draft 7)
//! under `schemas/`. An extract is serialized and checked before it reaches
//! a sink, so a column or type drift is caught at the producer.

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::ExtractSchemaError;
use crate::extract::{Extract, ExtractBundle};

static OVERVIEW_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/extract-overview.json"))
        .expect("Invalid embedded schema")
});

static CONDITIONS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/extract-conditions.json"))
        .expect("Invalid embedded schema")
});

static REGIONAL_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/extract-regional.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// Returns every violation message on failure.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Embedded schema for an extract name, if one is published.
pub fn schema_for(name: &str) -> Option<&'static Value> {
    match name {
        "overview" => Some(&*OVERVIEW_SCHEMA),
        "conditions" => Some(&*CONDITIONS_SCHEMA),
        "regional" => Some(&*REGIONAL_SCHEMA),
        _ => None,
    }
}

/// Check one extract against its published schema.
pub fn validate_extract(extract: &Extract) -> Result<(), ExtractSchemaError> {
    let schema = schema_for(&extract.name).ok_or_else(|| ExtractSchemaError {
        extract: extract.name.clone(),
        errors: vec!["no schema published for this extract".to_string()],
    })?;

    let data = serde_json::to_value(extract).map_err(|e| ExtractSchemaError {
        extract: extract.name.clone(),
        errors: vec![e.to_string()],
    })?;

    validate(schema, &data).map_err(|errors| ExtractSchemaError {
        extract: extract.name.clone(),
        errors,
    })
}

/// Check every extract of a bundle.
pub fn validate_bundle(bundle: &ExtractBundle) -> Result<(), ExtractSchemaError> {
    bundle.extracts().try_for_each(validate_extract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Cell;
    use serde_json::json;

    fn overview(rows: Vec<Vec<Cell>>) -> Extract {
        Extract {
            name: "overview".into(),
            version: "1.0".into(),
            columns: [
                "Year",
                "Month",
                "Admissions",
                "Total_Cost",
                "Avg_LOS",
                "Readmission_Rate",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            rows,
        }
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
    }

    #[test]
    fn test_embedded_schemas_load() {
        for name in ["overview", "conditions", "regional"] {
            assert!(schema_for(name).is_some(), "{name}");
        }
        assert!(schema_for("unknown").is_none());
    }

    #[test]
    fn test_valid_overview() {
        let extract = overview(vec![vec![
            Cell::Int(2024),
            Cell::Int(1),
            Cell::Int(3),
            Cell::Float(1500.0),
            Cell::Float(3.5),
            Cell::Float(0.25),
        ]]);
        assert!(validate_extract(&extract).is_ok());
    }

    #[test]
    fn test_overview_wrong_cell_type() {
        let extract = overview(vec![vec![
            Cell::Text("2024".into()),
            Cell::Int(1),
            Cell::Int(3),
            Cell::Float(1500.0),
            Cell::Float(3.5),
            Cell::Float(0.25),
        ]]);
        let err = validate_extract(&extract).unwrap_err();
        assert_eq!(err.extract, "overview");
        assert!(!err.errors.is_empty());
    }

    #[test]
    fn test_overview_short_row() {
        let extract = overview(vec![vec![Cell::Int(2024), Cell::Int(1)]]);
        assert!(validate_extract(&extract).is_err());
    }

    #[test]
    fn test_renamed_column_rejected() {
        let mut extract = overview(vec![]);
        extract.columns[2] = "Count".into();
        assert!(validate_extract(&extract).is_err());
    }
}
