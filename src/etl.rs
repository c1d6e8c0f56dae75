//! Batch orchestration: download, clean and load a range of months.
//!
//! Files are processed one at a time, in month order. A file that fails to
//! decode, clean or load is logged and skipped; the batch carries on with the
//! next month and reports every failure at the end.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::extract::{Extractor, parse_trip_file_name, read_trip_file, staged_trip_files};
use crate::load::{LoadMode, Loader};
use crate::pipeline::{PipelineSpec, apply};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// First year the trip-record dataset covers.
pub const FIRST_DATA_YEAR: i32 = 2009;

/// Default destination table.
pub const DEFAULT_TABLE: &str = "yellow_taxis";

/// The months of a batch: `start_month..=end_month` of every year in
/// `start_year..=end_year`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    start_year: i32,
    end_year: i32,
    start_month: u32,
    end_month: u32,
}

impl DateRange {
    pub fn new(start_year: i32, end_year: i32, start_month: u32, end_month: u32) -> Result<Self> {
        if start_year < FIRST_DATA_YEAR {
            return Err(EtlError::Config(format!(
                "start year {start_year} is before {FIRST_DATA_YEAR}, the first year with trip data"
            )));
        }
        if start_year > end_year {
            return Err(EtlError::Config(format!(
                "start year {start_year} is after end year {end_year}"
            )));
        }
        for month in [start_month, end_month] {
            if !(1..=12).contains(&month) {
                return Err(EtlError::Config(format!(
                    "month {month} is outside 1-12"
                )));
            }
        }
        if start_month > end_month {
            return Err(EtlError::Config(format!(
                "start month {start_month} is after end month {end_month}"
            )));
        }
        Ok(Self {
            start_year,
            end_year,
            start_month,
            end_month,
        })
    }

    /// Whole years, January to December.
    pub fn years(start_year: i32, end_year: i32) -> Result<Self> {
        Self::new(start_year, end_year, 1, 12)
    }

    pub fn contains(&self, year: i32, month: u32) -> bool {
        (self.start_year..=self.end_year).contains(&year)
            && (self.start_month..=self.end_month).contains(&month)
    }

    /// Every (year, month) of the range in chronological order.
    pub fn months(&self) -> impl Iterator<Item = (i32, u32)> + '_ {
        (self.start_year..=self.end_year)
            .flat_map(move |year| (self.start_month..=self.end_month).map(move |month| (year, month)))
    }
}

/// Options of one batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub range: DateRange,
    pub table: String,
    pub mode: LoadMode,
    pub pipeline: PipelineSpec,
    /// Use the files already staged instead of downloading.
    pub skip_download: bool,
}

impl RunOptions {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            table: DEFAULT_TABLE.to_owned(),
            mode: LoadMode::default(),
            pipeline: PipelineSpec::default_trip_cleaning(),
            skip_download: false,
        }
    }
}

/// What happened to one staged file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_loaded: u64,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
    pub duration: Duration,
}

impl BatchReport {
    pub fn rows_loaded(&self) -> u64 {
        self.files.iter().map(|f| f.rows_loaded).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.succeeded())
    }

    pub fn summary(&self) -> String {
        let failed = self.failed().count();
        format!(
            "{} files processed ({} failed), {} rows loaded, {:.1}s",
            self.files.len(),
            failed,
            self.rows_loaded(),
            self.duration.as_secs_f64()
        )
    }

    /// `Err(EtlError::Batch)` naming every failed file, if any.
    pub fn into_result(self) -> Result<Self> {
        let failed: Vec<PathBuf> = self.failed().map(|f| f.path.clone()).collect();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(EtlError::Batch {
                failed,
                total: self.files.len(),
            })
        }
    }
}

/// Staged files of `folder` that belong to `range`.
pub fn staged_files_in_range(folder: &Path, range: &DateRange) -> Result<Vec<PathBuf>> {
    Ok(staged_trip_files(folder)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_trip_file_name)
                .is_some_and(|(year, month)| range.contains(year, month))
        })
        .collect())
}

/// Run a whole batch.
///
/// Returns the report when every file went through, `EtlError::Batch` when
/// some failed. Errors before the first file (database unreachable, bad
/// table name) abort the batch.
pub async fn run_etl(config: &EtlConfig, options: &RunOptions) -> Result<BatchReport> {
    let start = Instant::now();
    crate::load::validate_table_name(&options.table)?;

    tracing::info!("Extraction started");
    let files = if options.skip_download {
        staged_files_in_range(&config.data_folder, &options.range)?
    } else {
        let extractor = Extractor::new(config.data_folder.clone())?;
        extractor.download_range(&options.range).await?
    };
    if files.is_empty() {
        tracing::warn!(folder = %config.data_folder.display(), "No trip files to process");
        return Ok(BatchReport {
            files: Vec::new(),
            duration: start.elapsed(),
        });
    }

    Loader::ensure_database(config).await?;
    let loader = Loader::connect(config.connect_options()).await?;
    loader.prepare_table(&options.table, options.mode).await?;

    let mut report = BatchReport::default();
    for path in files {
        tracing::info!(path = %path.display(), "Processing file");
        let outcome = match process_file(&loader, &path, options).await {
            Ok((rows_read, rows_loaded)) => FileOutcome {
                path,
                rows_read,
                rows_loaded,
                error: None,
            },
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "File failed, continuing with next file");
                FileOutcome {
                    path,
                    rows_read: 0,
                    rows_loaded: 0,
                    error: Some(err.to_string()),
                }
            }
        };
        report.files.push(outcome);
    }

    report.duration = start.elapsed();
    tracing::info!("{}", report.summary());
    report.into_result()
}

async fn process_file(loader: &Loader, path: &Path, options: &RunOptions) -> Result<(usize, u64)> {
    let raw = read_trip_file(path)?;
    let run = apply(&raw, &options.pipeline.steps)?;
    tracing::info!(
        path = %path.display(),
        rows_removed = run.report.rows_removed(),
        "{}",
        run.report.summary()
    );
    let rows = loader.append(&options.table, &run.table).await?;
    Ok((raw.height(), rows))
}
