//! # taxi-etl entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Initialize logging (console + rolling files)
//!   ├─> Create Tokio runtime
//!   └─> Execute the command
//! ```
//!
//! ```bash
//! taxi-etl run --start-year 2024 --end-year 2024 --start-month 1 --end-month 3
//! taxi-etl clean --input raw.parquet --output clean.parquet
//! taxi-etl pipeline show > spec.json
//! taxi-etl pipeline validate --spec spec.json --input raw.parquet
//! ```
//!
//! Any failure is returned from `main`, which prints it and exits non-zero.

#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    if let Err(err) = taxi_etl::logging::init(level) {
        // No writable data directory: keep console output at least.
        taxi_etl::logging::init_console(level);
        tracing::warn!("File logging disabled: {err:#}");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(cli::run_command(cli));

    if let Err(err) = &result {
        tracing::error!("{err:#}");
        if let Ok(path) = taxi_etl::logging::get_current_log_path() {
            tracing::info!("Details in {}", path.display());
        }
    }
    result
}
