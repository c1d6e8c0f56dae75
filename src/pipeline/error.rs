//! Failure taxonomy of the cleaning pipeline.

use super::validation::SemanticType;
use polars::error::PolarsError;
use thiserror::Error;

/// Why a single catalog operation refused or failed to transform a table.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A referenced column is absent from the table.
    #[error("column '{column}' does not exist")]
    MissingColumn { column: String },

    /// A column's type disagrees with what the operation requires.
    #[error("column '{column}' is {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: SemanticType,
    },

    /// A rename target collides with an existing column.
    #[error("column '{column}' already exists")]
    DuplicateColumn { column: String },

    /// Filtering left a required column without a single valid value.
    #[error("every value of column '{column}' is invalid after filtering")]
    AllValuesInvalid { column: String },

    /// Lower-level failure raised by the data engine.
    #[error("data processing failed: {0}")]
    Polars(#[from] PolarsError),
}

impl TransformError {
    pub(crate) fn missing(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_owned(),
        }
    }

    /// The column the failure is attributed to, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::MissingColumn { column }
            | Self::TypeMismatch { column, .. }
            | Self::DuplicateColumn { column }
            | Self::AllValuesInvalid { column } => Some(column),
            Self::Polars(_) => None,
        }
    }
}

/// A [`TransformError`] localized to the pipeline step that raised it.
#[derive(Debug, Error)]
#[error("step {} ({}) failed: {}", .index + 1, .operation, .source)]
pub struct StepError {
    /// Zero-based position of the failing step.
    pub index: usize,

    /// Name of the operation the step applies.
    pub operation: &'static str,

    #[source]
    pub source: TransformError,
}

impl StepError {
    pub fn kind(&self) -> &TransformError {
        &self.source
    }
}
