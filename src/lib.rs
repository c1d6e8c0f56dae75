//! # taxi_etl - NYC yellow-taxi trip records into PostgreSQL
//!
//! Downloads the monthly trip-record files published by the NYC Taxi &
//! Limousine Commission, cleans them with a configurable pipeline and loads
//! the result into a PostgreSQL table.
//!
//! ## Quick Start
//!
//! ```no_run
//! use taxi_etl::config::EtlConfig;
//! use taxi_etl::etl::{DateRange, RunOptions, run_etl};
//! use std::path::Path;
//!
//! # async fn example() -> taxi_etl::error::Result<()> {
//! let config = EtlConfig::from_file(Path::new("config.json"))?;
//! let options = RunOptions::new(DateRange::new(2024, 2024, 1, 3)?);
//! let report = run_etl(&config, &options).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`pipeline`]: Rule-driven cleaning of trip tables
//!   - [`pipeline::catalog`]: The cleaning operations
//!   - [`pipeline::spec`]: Pipelines as JSON data
//! - [`extract`]: Downloading and decoding monthly files
//! - [`load`]: Writing cleaned tables to PostgreSQL
//! - [`etl`]: Batch orchestration across a range of months
//! - [`schema`]: The fixed trip-record schema
//! - [`config`], [`error`], [`logging`], [`io`]: Supporting infrastructure
//!
//! ## Pipelines Are Data
//!
//! Cleaning is described by an ordered list of steps, so it can live in a
//! file, be reviewed, and be checked against a file's schema before it runs:
//!
//! ```no_run
//! use taxi_etl::pipeline::{PipelineSpec, apply};
//! # fn example(raw: polars::prelude::DataFrame) -> anyhow::Result<()> {
//! let spec = PipelineSpec::from_file("spec.json")?;
//! let cleaned = apply(&raw, &spec.steps)?.table;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod etl;
pub mod extract;
pub mod io;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod schema;
