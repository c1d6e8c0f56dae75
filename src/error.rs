//! Application-level error handling for the ETL run.
//!
//! Cleaning failures have their own taxonomy in [`crate::pipeline::error`];
//! [`EtlError`] wraps those together with everything that can go wrong around
//! them: downloads, files, the database and configuration.
//!
//! `From` conversions let `?` lift library errors into an `EtlError`, and
//! [`ResultExt`] adds a message in front of the original error:
//!
//! ```no_run
//! use taxi_etl::error::ResultExt;
//! use std::fs;
//!
//! fn load_config() -> taxi_etl::error::Result<String> {
//!     let raw = fs::read_to_string("config.json").context("Failed to read config")?;
//!     Ok(raw)
//! }
//! ```

use crate::pipeline::StepError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ETL operations.
#[derive(Debug, Error)]
pub enum EtlError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data processing errors (Polars, parsing, etc.)
    #[error("Data processing error: {0}")]
    DataProcessing(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(String),

    /// Download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid or missing configuration, including bad CLI arguments
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cleaning step failed
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] StepError),

    /// Some files of a batch failed; the others were processed.
    #[error("{} of {total} files failed: {}", .failed.len(), display_paths(.failed))]
    Batch { failed: Vec<PathBuf>, total: usize },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<anyhow::Error> for EtlError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for EtlError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EtlError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", f(), err))
        })
    }
}
