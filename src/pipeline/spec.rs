//! Pipeline specification data structures.
//!
//! Defines the JSON schema for pipeline specs: an ordered list of cleaning
//! steps plus the settings used when a cleaned table is written to a file.

use super::catalog::Catalog;
use super::error::TransformError;
use crate::schema::{
    DEFAULT_DATE_FORMAT, MONETARY_COLUMNS, PAYMENT_TYPE, RATECODE_ID, REQUIRED_TRIP_COLUMNS,
    STORE_AND_FWD_FLAG, TRIP_DATETIME_COLUMNS, USD_TO_EUR, VENDOR_ID,
};
use anyhow::{Context as _, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current pipeline spec version
pub const SPEC_VERSION: &str = "0.1";

/// Root pipeline specification structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Specification version for future migrations
    pub version: String,

    /// Human-readable pipeline name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered sequence of cleaning steps
    pub steps: Vec<Step>,

    /// Output file configuration
    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineSpec {
    /// Create an empty pipeline spec
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: SPEC_VERSION.to_owned(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            output: OutputConfig::default(),
        }
    }

    /// The cleaning applied to every monthly trip file by default.
    ///
    /// Exact duplicates go first, then rows with codes outside the published
    /// data dictionary, then rows missing a required field, and finally rows
    /// whose timestamps do not parse.
    pub fn default_trip_cleaning() -> Self {
        let mut spec = Self::new("yellow_taxi_default");
        spec.description =
            Some("Deduplicate, filter invalid codes, drop incomplete trips".to_owned());
        spec.steps = vec![
            Step::Deduplicate,
            Step::AllowListFilter {
                column: VENDOR_ID.to_owned(),
                values: AllowedValue::integers(&[1, 2, 6, 7]),
            },
            Step::AllowListFilter {
                column: RATECODE_ID.to_owned(),
                values: AllowedValue::integers(&[1, 2, 3, 4, 5, 6, 99]),
            },
            Step::AllowListFilter {
                column: STORE_AND_FWD_FLAG.to_owned(),
                values: vec![
                    AllowedValue::Text("Y".to_owned()),
                    AllowedValue::Text("N".to_owned()),
                ],
            },
            Step::AllowListFilter {
                column: PAYMENT_TYPE.to_owned(),
                values: AllowedValue::integers(&[0, 1, 2, 3, 4, 5, 6]),
            },
            Step::DropNullRows {
                columns: default_required_columns(),
            },
            Step::EnforceDateFormat {
                columns: default_datetime_columns(),
                format: default_date_format(),
            },
        ];
        spec
    }

    /// Load a pipeline spec from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline spec file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a pipeline spec from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse pipeline spec JSON")
    }

    /// Save pipeline spec to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json).context("Failed to write pipeline spec file")
    }

    /// Serialize pipeline spec to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize pipeline spec")
    }
}

/// Output file configuration, used when a pipeline writes to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Format used when the output path has no recognised extension
    #[serde(default = "default_parquet_format")]
    pub format: String,

    /// Whether to overwrite existing files
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_parquet_format(),
            overwrite: default_true(),
        }
    }
}

/// One cleaning step (tagged enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Remove exact duplicate rows
    Deduplicate,

    /// Keep rows whose value in `column` is listed
    AllowListFilter {
        column: String,
        values: Vec<AllowedValue>,
    },

    /// Remove rows with a missing value in any listed column
    DropNullRows {
        #[serde(default = "default_required_columns")]
        columns: Vec<String>,
    },

    /// Trim and lowercase text columns
    NormalizeStrings { columns: Vec<String> },

    /// Parse timestamps and drop rows that do not match the format
    EnforceDateFormat {
        #[serde(default = "default_datetime_columns")]
        columns: Vec<String>,

        /// chrono-style format string
        #[serde(default = "default_date_format")]
        format: String,
    },

    /// Rename columns according to mapping
    RenameColumns { mapping: BTreeMap<String, String> },

    /// Miles to kilometres on `trip_distance`
    ConvertDistanceUnits,

    /// Multiply monetary columns by `rate`
    ConvertCurrencyColumns {
        #[serde(default = "default_monetary_columns")]
        columns: Vec<String>,

        #[serde(default = "default_rate")]
        rate: f64,
    },
}

impl Step {
    /// Operation name as it appears in the `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deduplicate => "deduplicate",
            Self::AllowListFilter { .. } => "allow_list_filter",
            Self::DropNullRows { .. } => "drop_null_rows",
            Self::NormalizeStrings { .. } => "normalize_strings",
            Self::EnforceDateFormat { .. } => "enforce_date_format",
            Self::RenameColumns { .. } => "rename_columns",
            Self::ConvertDistanceUnits => "convert_distance_units",
            Self::ConvertCurrencyColumns { .. } => "convert_currency_columns",
        }
    }

    /// Run this step through `catalog`.
    pub fn apply<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        df: &DataFrame,
    ) -> std::result::Result<DataFrame, TransformError> {
        match self {
            Self::Deduplicate => catalog.deduplicate(df),
            Self::AllowListFilter { column, values } => {
                catalog.allow_list_filter(df, column, values)
            }
            Self::DropNullRows { columns } => catalog.drop_null_rows(df, columns),
            Self::NormalizeStrings { columns } => catalog.normalize_strings(df, columns),
            Self::EnforceDateFormat { columns, format } => {
                catalog.enforce_date_format(df, columns, format)
            }
            Self::RenameColumns { mapping } => catalog.rename_columns(df, mapping),
            Self::ConvertDistanceUnits => catalog.convert_distance_units(df),
            Self::ConvertCurrencyColumns { columns, rate } => {
                catalog.convert_currency_columns(df, columns, *rate)
            }
        }
    }
}

/// A member of an allow-list. JSON numbers and strings map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AllowedValue {
    pub fn integers(values: &[i64]) -> Vec<Self> {
        values.iter().copied().map(Self::Integer).collect()
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

// Default value functions
fn default_required_columns() -> Vec<String> {
    REQUIRED_TRIP_COLUMNS.iter().map(|&c| c.to_owned()).collect()
}

fn default_datetime_columns() -> Vec<String> {
    TRIP_DATETIME_COLUMNS.iter().map(|&c| c.to_owned()).collect()
}

fn default_monetary_columns() -> Vec<String> {
    MONETARY_COLUMNS.iter().map(|&c| c.to_owned()).collect()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_owned()
}

fn default_rate() -> f64 {
    USD_TO_EUR
}

fn default_parquet_format() -> String {
    "parquet".to_owned()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_serialization() {
        let mut spec = PipelineSpec::new("test_pipeline");
        spec.steps.push(Step::Deduplicate);
        spec.steps.push(Step::NormalizeStrings {
            columns: vec!["store_and_fwd_flag".to_owned()],
        });

        let json = spec.to_json().expect("Failed to serialize");
        assert!(json.contains("\"version\": \"0.1\""));
        assert!(json.contains("\"op\": \"normalize_strings\""));

        let parsed = PipelineSpec::from_json(&json).expect("Failed to parse");
        assert_eq!(parsed.name, "test_pipeline");
        assert_eq!(parsed.steps, spec.steps);
    }

    #[test]
    fn test_omitted_parameters_take_defaults() {
        let json = r#"{
            "version": "0.1",
            "name": "defaults",
            "steps": [
                {"op": "drop_null_rows"},
                {"op": "enforce_date_format"},
                {"op": "convert_currency_columns"},
                {"op": "allow_list_filter", "column": "store_and_fwd_flag", "values": ["Y", "N"]},
                {"op": "allow_list_filter", "column": "VendorID", "values": [1, 2]}
            ]
        }"#;

        let spec = PipelineSpec::from_json(json).expect("Failed to parse");

        assert!(matches!(&spec.steps[0], Step::DropNullRows { columns } if columns.len() == 19));
        assert!(matches!(
            &spec.steps[1],
            Step::EnforceDateFormat { columns, format }
                if columns.len() == 2 && format == DEFAULT_DATE_FORMAT
        ));
        assert!(matches!(
            &spec.steps[2],
            Step::ConvertCurrencyColumns { columns, rate }
                if columns.len() == 9 && (*rate - 0.92).abs() < f64::EPSILON
        ));
        assert!(matches!(
            &spec.steps[3],
            Step::AllowListFilter { values, .. } if values.iter().all(AllowedValue::is_text)
        ));
        assert!(matches!(
            &spec.steps[4],
            Step::AllowListFilter { values, .. } if values == &AllowedValue::integers(&[1, 2])
        ));
        assert!(spec.output.overwrite);
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        let json = r#"{"version": "0.1", "name": "x", "steps": [{"op": "explode"}]}"#;
        assert!(PipelineSpec::from_json(json).is_err());
    }

    #[test]
    fn test_default_trip_cleaning_order() {
        let spec = PipelineSpec::default_trip_cleaning();
        let names: Vec<&str> = spec.steps.iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec![
                "deduplicate",
                "allow_list_filter",
                "allow_list_filter",
                "allow_list_filter",
                "allow_list_filter",
                "drop_null_rows",
                "enforce_date_format",
            ]
        );
    }

    #[test]
    fn test_default_spec_roundtrips_through_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spec.json");
        let spec = PipelineSpec::default_trip_cleaning();

        spec.to_file(&path)?;
        let loaded = PipelineSpec::from_file(&path)?;

        assert_eq!(loaded.steps, spec.steps);
        Ok(())
    }
}
