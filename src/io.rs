//! Reading and writing trip tables on local disk.

use anyhow::{Context as _, Result};
use polars::prelude::*;
use std::path::Path;

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Load a CSV or Parquet file into memory.
pub fn load_table(path: &Path) -> Result<DataFrame> {
    let ext = extension(path);
    let df = match ext.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_has_header(true)
            .finish()?
            .collect()
            .with_context(|| format!("Failed to read CSV {}", path.display()))?,
        "parquet" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            ParquetReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read Parquet {}", path.display()))?
        }
        _ => return Err(anyhow::anyhow!("Unsupported file extension: {ext}")),
    };
    Ok(df)
}

/// Write `df` as Parquet or CSV. `fallback_format` is used when the path has
/// no recognised extension.
pub fn save_table(df: &mut DataFrame, path: &Path, fallback_format: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let ext = match extension(path).as_str() {
        ext @ ("parquet" | "csv") => ext.to_owned(),
        _ => fallback_format.to_lowercase(),
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    match ext.as_str() {
        "parquet" => {
            ParquetWriter::new(file)
                .finish(df)
                .context("Failed to write Parquet file")?;
        }
        "csv" => {
            CsvWriter::new(file)
                .include_header(true)
                .finish(df)
                .context("Failed to write CSV file")?;
        }
        other => return Err(anyhow::anyhow!("Unsupported output format: {other}")),
    }

    Ok(())
}
