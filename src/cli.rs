use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use taxi_etl::config::{DEFAULT_CONFIG_PATH, EtlConfig};
use taxi_etl::etl::{DEFAULT_TABLE, DateRange, RunOptions, run_etl};
use taxi_etl::io::load_table;
use taxi_etl::load::LoadMode;
use taxi_etl::pipeline::{PipelineSpec, run_pipeline, validate_pipeline};

#[derive(Parser)]
#[command(
    name = "taxi-etl",
    about = "Download, clean and load NYC yellow-taxi trip records"
)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, env = "TAXI_ETL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log debug events
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, clean and load a range of months into the database
    Run {
        /// First year to process (2009 or later)
        #[arg(long)]
        start_year: i32,

        /// Last year to process
        #[arg(long)]
        end_year: i32,

        /// First month of each year
        #[arg(long, default_value_t = 1)]
        start_month: u32,

        /// Last month of each year
        #[arg(long, default_value_t = 12)]
        end_month: u32,

        /// Destination table
        #[arg(short, long, default_value = DEFAULT_TABLE)]
        table: String,

        /// development empties the table first, production appends
        #[arg(long, value_enum, default_value_t = LoadMode::Development)]
        mode: LoadMode,

        /// Pipeline spec to use instead of the built-in cleaning
        #[arg(long)]
        pipeline: Option<PathBuf>,

        /// Process already staged files without downloading
        #[arg(long)]
        skip_download: bool,
    },
    /// Clean a local file and save the result
    Clean {
        /// Input file (Parquet or CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (Parquet or CSV)
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline spec to use instead of the built-in cleaning
        #[arg(long)]
        spec: Option<PathBuf>,
    },
    /// Inspect and check pipeline specs
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
}

#[derive(Subcommand)]
pub enum PipelineAction {
    /// Print the built-in cleaning spec as JSON
    Show {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a spec against the columns of a file without running it
    Validate {
        #[arg(long)]
        spec: PathBuf,

        #[arg(long)]
        input: PathBuf,
    },
}

fn load_spec(path: Option<&Path>) -> Result<PipelineSpec> {
    match path {
        Some(path) => PipelineSpec::from_file(path),
        None => Ok(PipelineSpec::default_trip_cleaning()),
    }
}

pub async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            start_year,
            end_year,
            start_month,
            end_month,
            table,
            mode,
            pipeline,
            skip_download,
        } => {
            // Arguments first, so a typo never triggers a download.
            let range = DateRange::new(start_year, end_year, start_month, end_month)?;
            let config = EtlConfig::from_file(&cli.config)?;
            let mut options = RunOptions::new(range);
            options.table = table;
            options.mode = mode;
            options.pipeline = load_spec(pipeline.as_deref())?;
            options.skip_download = skip_download;

            let report = run_etl(&config, &options).await?;
            println!("{}", report.summary());
            Ok(())
        }
        Commands::Clean {
            input,
            output,
            spec,
        } => {
            let spec = load_spec(spec.as_deref())?;
            let report = run_pipeline(&spec, &input, &output)?;
            println!("{}", report.summary());
            println!("Cleaned file written to {}", output.display());
            Ok(())
        }
        Commands::Pipeline { action } => handle_pipeline(action),
    }
}

fn handle_pipeline(action: PipelineAction) -> Result<()> {
    match action {
        PipelineAction::Show { output } => {
            let spec = PipelineSpec::default_trip_cleaning();
            match output {
                Some(path) => {
                    spec.to_file(&path)?;
                    println!("Spec written to {}", path.display());
                }
                None => println!("{}", spec.to_json()?),
            }
            Ok(())
        }
        PipelineAction::Validate { spec, input } => {
            let spec = PipelineSpec::from_file(&spec)?;
            let df: DataFrame = load_table(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let findings = validate_pipeline(&spec, &df.schema());
            if findings.is_empty() {
                println!("Pipeline '{}' is valid for {}", spec.name, input.display());
                return Ok(());
            }
            for finding in &findings {
                println!("{finding}");
            }
            Err(anyhow::anyhow!(
                "{} problem(s) found in pipeline '{}'",
                findings.len(),
                spec.name
            ))
        }
    }
}
