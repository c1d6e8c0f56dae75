//! Column assertions and pre-flight validation of pipeline specs.
//!
//! The assertion helpers (`column_exists`, `is_string_column`, ...) are what
//! every catalog operation calls before touching a column, so that schema
//! problems surface as [`TransformError::MissingColumn`] or
//! [`TransformError::TypeMismatch`] instead of an engine error.
//!
//! [`validate_pipeline`] walks a whole spec against an input schema without
//! touching any data, catching errors early with actionable messages.

use super::error::TransformError;
use super::spec::{PipelineSpec, SPEC_VERSION, Step};
use crate::schema::TRIP_DISTANCE;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic type of a column, derived from its engine dtype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Integer,
    Float,
    String,
    Timestamp,
    Categorical,
    Boolean,
    Other,
}

impl SemanticType {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::String => Self::String,
            DataType::Boolean => Self::Boolean,
            DataType::Categorical(..) | DataType::Enum(..) => Self::Categorical,
            dtype if dtype.is_integer() => Self::Integer,
            dtype if dtype.is_float() => Self::Float,
            DataType::Date | DataType::Datetime(..) => Self::Timestamp,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Categorical => "categorical",
            Self::Boolean => "boolean",
            Self::Other => "other",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fails with `MissingColumn` unless `name` is a column of `df`.
pub fn column_exists<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, TransformError> {
    df.get_columns()
        .iter()
        .find(|column| column.name().as_str() == name)
        .ok_or_else(|| TransformError::missing(name))
}

/// Semantic type of an existing column.
pub fn column_type(df: &DataFrame, name: &str) -> Result<SemanticType, TransformError> {
    column_exists(df, name).map(|column| SemanticType::of(column.dtype()))
}

pub fn is_string_column(df: &DataFrame, name: &str) -> Result<(), TransformError> {
    expect_type(df, name, "string", |kind| kind == SemanticType::String)
}

pub fn is_numeric_column(df: &DataFrame, name: &str) -> Result<(), TransformError> {
    expect_type(df, name, "numeric", SemanticType::is_numeric)
}

pub fn is_temporal_column(df: &DataFrame, name: &str) -> Result<(), TransformError> {
    expect_type(df, name, "temporal", |kind| kind == SemanticType::Timestamp)
}

fn expect_type(
    df: &DataFrame,
    name: &str,
    expected: &'static str,
    accepts: impl Fn(SemanticType) -> bool,
) -> Result<(), TransformError> {
    let actual = column_type(df, name)?;
    if accepts(actual) {
        Ok(())
    } else {
        Err(TransformError::TypeMismatch {
            column: name.to_owned(),
            expected,
            actual,
        })
    }
}

/// Validation finding with helpful context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub step_index: Option<usize>,
    pub message: String,
}

impl ValidationError {
    fn new(step_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            step_index,
            message: message.into(),
        }
    }

    fn step(step_index: usize, message: impl Into<String>) -> Self {
        Self::new(Some(step_index), message)
    }

    fn spec(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(idx) = self.step_index {
            write!(f, "Step {}: {}", idx + 1, self.message)
        } else {
            write!(f, "Spec: {}", self.message)
        }
    }
}

/// Validate a pipeline spec against an input schema
///
/// Simulates the column flow step by step, so a rename in step 2 makes the new
/// name visible to step 3. Returns every finding rather than stopping at the
/// first one.
pub fn validate_pipeline(spec: &PipelineSpec, input_schema: &Schema) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if spec.version != SPEC_VERSION {
        errors.push(ValidationError::spec(format!(
            "Unsupported spec version '{}', expected '{SPEC_VERSION}'",
            spec.version
        )));
    }

    let mut columns: HashMap<String, SemanticType> = input_schema
        .iter()
        .map(|(name, dtype)| (name.as_str().to_owned(), SemanticType::of(dtype)))
        .collect();

    for (idx, step) in spec.steps.iter().enumerate() {
        validate_step(step, idx, &mut columns, &mut errors);
    }

    errors
}

fn validate_step(
    step: &Step,
    idx: usize,
    columns: &mut HashMap<String, SemanticType>,
    errors: &mut Vec<ValidationError>,
) {
    match step {
        Step::Deduplicate => {}

        Step::AllowListFilter { column, .. } => {
            require_columns(std::slice::from_ref(column), columns, idx, "filter", errors);
        }

        Step::DropNullRows { columns: targets } => {
            require_columns(targets, columns, idx, "check nulls in", errors);
        }

        Step::NormalizeStrings { columns: targets } => {
            for name in targets {
                match columns.get(name) {
                    None => errors.push(missing(idx, "normalize", name)),
                    Some(SemanticType::String) => {}
                    Some(other) => errors.push(ValidationError::step(
                        idx,
                        format!("Cannot normalize '{name}': column is {other}, expected string"),
                    )),
                }
            }
        }

        Step::EnforceDateFormat {
            columns: targets, ..
        } => {
            for name in targets {
                match columns.get(name).copied() {
                    None => errors.push(missing(idx, "parse dates in", name)),
                    Some(SemanticType::String | SemanticType::Timestamp) => {
                        columns.insert(name.clone(), SemanticType::Timestamp);
                    }
                    Some(other) => errors.push(ValidationError::step(
                        idx,
                        format!("Cannot parse dates in '{name}': column is {other}"),
                    )),
                }
            }
        }

        Step::RenameColumns { mapping } => {
            for (from, to) in mapping {
                if !columns.contains_key(from) {
                    errors.push(missing(idx, "rename", from));
                } else if columns.contains_key(to) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename '{from}' to '{to}': target already exists"),
                    ));
                } else if let Some(kind) = columns.remove(from) {
                    columns.insert(to.clone(), kind);
                }
            }
        }

        Step::ConvertDistanceUnits => {
            require_numeric(&[TRIP_DISTANCE.to_owned()], columns, idx, errors);
        }

        Step::ConvertCurrencyColumns {
            columns: targets, ..
        } => {
            require_numeric(targets, columns, idx, errors);
        }
    }
}

fn require_numeric(
    targets: &[String],
    columns: &mut HashMap<String, SemanticType>,
    idx: usize,
    errors: &mut Vec<ValidationError>,
) {
    for name in targets {
        match columns.get(name).copied() {
            None => errors.push(missing(idx, "convert", name)),
            Some(kind) if kind.is_numeric() => {
                columns.insert(name.clone(), SemanticType::Float);
            }
            Some(other) => errors.push(ValidationError::step(
                idx,
                format!("Cannot convert '{name}': column is {other}, expected numeric"),
            )),
        }
    }
}

/// Helper to validate that all specified columns exist
fn require_columns(
    targets: &[String],
    columns: &HashMap<String, SemanticType>,
    idx: usize,
    operation: &str,
    errors: &mut Vec<ValidationError>,
) {
    for name in targets {
        if !columns.contains_key(name) {
            errors.push(missing(idx, operation, name));
        }
    }
}

fn missing(idx: usize, operation: &str, name: &str) -> ValidationError {
    ValidationError::step(idx, format!("Cannot {operation} non-existent column '{name}'"))
}
