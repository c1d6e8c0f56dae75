//! Rule-driven cleaning pipeline for trip-record tables.
//!
//! A pipeline is plain data: an ordered list of [`Step`]s, each naming one
//! catalog operation together with its typed parameters. The executor applies
//! the steps strictly in declaration order, each on the output of the previous
//! one, and aborts on the first failure with the step position attached.
//!
//! # Overview
//!
//! The catalog provides eight operations:
//! - **Rows**: `deduplicate`, `allow_list_filter`, `drop_null_rows`
//! - **Text**: `normalize_strings`
//! - **Dates**: `enforce_date_format`
//! - **Columns**: `rename_columns`
//! - **Units**: `convert_distance_units`, `convert_currency_columns`
//!
//! # Example: Cleaning a Table
//!
//! ```no_run
//! use taxi_etl::pipeline::{PipelineSpec, apply};
//! use polars::prelude::*;
//!
//! # fn example(raw: DataFrame) -> anyhow::Result<()> {
//! let spec = PipelineSpec::default_trip_cleaning();
//! let run = apply(&raw, &spec.steps)?;
//! println!("{}", run.report.summary());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod error;
pub mod executor;
pub mod spec;
pub mod validation;

pub use catalog::{Catalog, StandardCatalog};
pub use error::{StepError, TransformError};
pub use executor::{PipelineRun, RunReport, apply, apply_with, run_pipeline};
pub use spec::{AllowedValue, OutputConfig, PipelineSpec, SPEC_VERSION, Step};
pub use validation::{SemanticType, ValidationError, validate_pipeline};
