//! Downloading and decoding the monthly trip files.
//!
//! Files are staged under the configured data folder with their published
//! names (`yellow_tripdata_2024-01.parquet`). A staged file that passes
//! [`verify_parquet_file`] is never downloaded again.

use crate::error::{EtlError, Result, ResultExt as _};
use crate::etl::DateRange;
use crate::schema::align_to_trip_schema;
use polars::prelude::*;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt as _;

/// Public bucket the monthly yellow-taxi files are published to.
pub const TRIP_DATA_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";
const FILE_PREFIX: &str = "yellow_tripdata_";

pub fn trip_file_name(year: i32, month: u32) -> String {
    format!("{FILE_PREFIX}{year}-{month:02}.parquet")
}

pub fn trip_file_url(year: i32, month: u32) -> String {
    format!("{TRIP_DATA_BASE_URL}/{}", trip_file_name(year, month))
}

/// Year and month encoded in a staged file name, if it follows the published
/// naming scheme.
pub fn parse_trip_file_name(name: &str) -> Option<(i32, u32)> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(".parquet")?;
    let (year, month) = stem.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year.parse().ok()?, month))
}

/// Cheap integrity check: the file must be large enough to hold the header
/// and footer magic, and start and end with `PAR1`.
pub fn verify_parquet_file(path: &Path) -> Result<()> {
    let corrupt = |reason: &str| {
        EtlError::DataProcessing(format!("{} is not a valid parquet file: {reason}", path.display()))
    };

    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len <= 2 * PARQUET_MAGIC.len() as u64 {
        return Err(corrupt("too short"));
    }

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != PARQUET_MAGIC {
        return Err(corrupt("missing header magic"));
    }
    file.seek(SeekFrom::End(-4))?;
    file.read_exact(&mut magic)?;
    if &magic != PARQUET_MAGIC {
        return Err(corrupt("missing footer magic, the download may be truncated"));
    }
    Ok(())
}

/// Decode one staged file onto the canonical trip schema.
pub fn read_trip_file(path: &Path) -> Result<DataFrame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read parquet {}", path.display()))?;
    Ok(align_to_trip_schema(&df)?)
}

/// Staged `.parquet` files of `folder`, sorted by name (and so by month).
pub fn staged_trip_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(EtlError::Config(format!(
            "data folder {} does not exist",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_parquet = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
        if is_parquet && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Downloads monthly files into the staging folder.
#[derive(Debug, Clone)]
pub struct Extractor {
    client: reqwest::Client,
    base_url: String,
    data_folder: PathBuf,
}

impl Extractor {
    pub fn new(data_folder: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            client,
            base_url: TRIP_DATA_BASE_URL.to_owned(),
            data_folder: data_folder.into(),
        })
    }

    /// Use a different origin, e.g. a local mirror.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn staged_path(&self, year: i32, month: u32) -> PathBuf {
        self.data_folder.join(trip_file_name(year, month))
    }

    /// Fetch every month of `range` that is not staged yet.
    ///
    /// Months the server does not serve are logged and skipped. Returns the
    /// staged files of the range, whether freshly downloaded or already there.
    pub async fn download_range(&self, range: &DateRange) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.data_folder)
            .await
            .with_context(|| format!("Failed to create {}", self.data_folder.display()))?;

        let mut staged = Vec::new();
        for (year, month) in range.months() {
            if let Some(path) = self.download_month(year, month).await? {
                staged.push(path);
            }
        }
        tracing::info!(files = staged.len(), "Extraction finished");
        Ok(staged)
    }

    /// Fetch a single month. `Ok(None)` means the month was skipped.
    pub async fn download_month(&self, year: i32, month: u32) -> Result<Option<PathBuf>> {
        let path = self.staged_path(year, month);
        if verify_parquet_file(&path).is_ok() {
            tracing::debug!(path = %path.display(), "Already staged, skipping download");
            return Ok(Some(path));
        }

        let url = format!("{}/{}", self.base_url, trip_file_name(year, month));
        tracing::info!(%url, "Downloading");
        let mut response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            tracing::warn!(%url, status = %response.status(), "Download failed, skipping month");
            return Ok(None);
        }

        // Stream into a side file so an interrupted download never looks staged.
        let partial = path.with_extension("parquet.part");
        let mut file = tokio::fs::File::create(&partial).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if let Err(err) = verify_parquet_file(&partial) {
            tracing::warn!(%url, error = %err, "Downloaded file is corrupt, skipping month");
            tokio::fs::remove_file(&partial).await?;
            return Ok(None);
        }
        tokio::fs::rename(&partial, &path).await?;
        Ok(Some(path))
    }
}
