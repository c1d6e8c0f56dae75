//! Writing cleaned trip tables to PostgreSQL.
//!
//! The destination table has a fixed layout: an identity `id` followed by one
//! column per trip field. Rows are streamed with `COPY ... FROM STDIN` in CSV
//! chunks, which is far faster than row-wise inserts for month-sized files.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result, ResultExt as _};
use crate::schema::{TRIP_FIELDS, TripField};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{Connection as _, Pool, Postgres};
use std::time::Duration;

/// Rows per `COPY` chunk.
pub const COPY_CHUNK_ROWS: usize = 10_000;

/// How a batch treats rows already in the destination table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Empty the table before the first file of a batch is written.
    #[default]
    Development,
    /// Keep existing rows and append.
    Production,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Table names must be plain identifiers: a letter or underscore followed by
/// letters, digits or underscores, at most 63 bytes.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(EtlError::Config(format!("invalid table name '{name}'")))
    }
}

/// DDL of the destination table.
pub fn create_table_sql(table: &str) -> String {
    let columns: Vec<String> = TRIP_FIELDS
        .iter()
        .map(|field| format!("    {} {}", quote(field.column), field.kind.sql_type()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \"id\" BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n{}\n)",
        quote(table),
        columns.join(",\n")
    )
}

fn copy_sql(table: &str) -> String {
    let columns: Vec<String> = TRIP_FIELDS.iter().map(|field| quote(field.column)).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '')",
        quote(table),
        columns.join(", ")
    )
}

fn find_field<'a>(df: &'a DataFrame, field: &TripField) -> Option<&'a str> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .find(|&name| name == field.source || name == field.column)
}

/// Select the trip fields of `df` in table order, cast to their storage types
/// and named after the table columns.
///
/// Columns may carry either the source or the table name. Extra columns are
/// dropped; a missing trip field is an error.
pub fn prepare_for_load(df: &DataFrame) -> Result<DataFrame> {
    let mut exprs = Vec::with_capacity(TRIP_FIELDS.len());
    let mut missing = Vec::new();
    for field in &TRIP_FIELDS {
        match find_field(df, field) {
            Some(name) => exprs.push(col(name).cast(field.kind.dtype()).alias(field.column)),
            None => missing.push(field.source),
        }
    }

    if !missing.is_empty() {
        return Err(EtlError::DataProcessing(format!(
            "cannot load table without trip fields: {}",
            missing.join(", ")
        )));
    }

    Ok(df.clone().lazy().select(exprs).collect()?)
}

pub struct Loader {
    pool: Pool<Postgres>,
}

impl Loader {
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to connect to PostgreSQL (timeout after 10s)")?;
        Ok(Self { pool })
    }

    /// Create the configured database through the maintenance database when
    /// it does not exist yet.
    pub async fn ensure_database(config: &EtlConfig) -> Result<()> {
        let mut conn = PgConnection::connect_with(&config.maintenance_options())
            .await
            .with_context(|| format!("Failed to connect to '{}'", config.maintenance_db))?;

        let exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(&config.db_name)
            .fetch_optional(&mut conn)
            .await?
            .is_some();

        if !exists {
            sqlx::query(&format!("CREATE DATABASE {}", quote(&config.db_name)))
                .execute(&mut conn)
                .await
                .with_context(|| format!("Failed to create database '{}'", config.db_name))?;
            tracing::info!(database = %config.db_name, "Database created");
        }

        conn.close().await?;
        Ok(())
    }

    /// Create the table if needed and, in development mode, empty it.
    ///
    /// `TRUNCATE` keeps the identity sequence, so ids keep increasing across
    /// development runs.
    pub async fn prepare_table(&self, table: &str, mode: LoadMode) -> Result<()> {
        validate_table_name(table)?;

        sqlx::query(&create_table_sql(table))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create table '{table}'"))?;

        if mode == LoadMode::Development {
            sqlx::query(&format!("TRUNCATE TABLE {}", quote(table)))
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to truncate table '{table}'"))?;
            tracing::info!(table, "Table truncated (development mode)");
        }
        Ok(())
    }

    /// Append the rows of `df`. Returns the number of rows written.
    pub async fn append(&self, table: &str, df: &DataFrame) -> Result<u64> {
        validate_table_name(table)?;
        let prepared = prepare_for_load(df)?;

        let mut conn = self.pool.acquire().await?;
        let mut writer = conn
            .copy_in_raw(&copy_sql(table))
            .await
            .context("Failed to initiate COPY command")?;

        let height = prepared.height();
        for offset in (0..height).step_by(COPY_CHUNK_ROWS) {
            let len = COPY_CHUNK_ROWS.min(height - offset);
            let mut chunk = prepared.slice(offset as i64, len);

            let mut buf = Vec::new();
            CsvWriter::new(&mut buf)
                .include_header(false)
                .with_separator(b',')
                .with_null_value(String::new())
                .finish(&mut chunk)
                .context("Failed to serialize dataframe chunk to CSV")?;

            writer
                .send(buf)
                .await
                .context("Failed to send data chunk via COPY")?;
        }

        let rows = writer
            .finish()
            .await
            .context("Failed to finish COPY command")?;
        tracing::info!(table, rows, "Rows loaded");
        Ok(rows)
    }

    /// Prepare the table for `mode` and append `df`.
    pub async fn load(&self, table: &str, df: &DataFrame, mode: LoadMode) -> Result<u64> {
        self.prepare_table(table, mode).await?;
        self.append(table, df).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CBD_CONGESTION_FEE, TRIP_DISTANCE, align_to_trip_schema};

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("yellow_taxis").is_ok());
        assert!(validate_table_name("_trips2024").is_ok());
        for bad in ["", "2024trips", "trips; DROP TABLE x", "yellow-taxis", "\"q\""] {
            assert!(validate_table_name(bad).is_err(), "{bad} should be rejected");
        }
        assert!(validate_table_name(&"t".repeat(64)).is_err());
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("yellow_taxis");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"yellow_taxis\""));
        assert!(sql.contains("\"id\" BIGINT GENERATED ALWAYS AS IDENTITY"));
        assert!(sql.contains("\"ratecode_id\" BIGINT"));
        assert!(sql.contains("\"store_and_fwd_flag\" VARCHAR(1)"));
        assert!(sql.contains("\"tpep_pickup_datetime\" TIMESTAMP"));
        assert_eq!(sql.matches(',').count(), TRIP_FIELDS.len());
    }

    #[test]
    fn test_copy_sql_lists_columns_in_table_order() {
        let sql = copy_sql("trips");
        assert!(sql.starts_with("COPY \"trips\" (\"vendor_id\", \"tpep_pickup_datetime\""));
        assert!(sql.ends_with("FROM STDIN WITH (FORMAT csv, NULL '')"));
    }

    fn source_frame() -> DataFrame {
        let columns: Vec<Column> = TRIP_FIELDS
            .iter()
            .filter(|field| field.source != CBD_CONGESTION_FEE)
            .map(|field| Series::new(field.source.into(), [1i64, 2]).into())
            .collect();
        DataFrame::new(columns).expect("unique names")
    }

    #[test]
    fn test_prepare_for_load_casts_and_renames() -> anyhow::Result<()> {
        let aligned = align_to_trip_schema(&source_frame())?;
        let mut with_extra = aligned.clone();
        with_extra.with_column(Series::new("extra_col".into(), [0i32, 0]))?;

        let prepared = prepare_for_load(&with_extra)?;

        let names: Vec<&str> = prepared
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .collect();
        let expected: Vec<&str> = TRIP_FIELDS.iter().map(|field| field.column).collect();
        assert_eq!(names, expected);
        assert_eq!(prepared.column("vendor_id")?.dtype(), &DataType::Int64);
        assert_eq!(prepared.column(TRIP_DISTANCE)?.dtype(), &DataType::Float64);
        assert_eq!(prepared.column("cbd_congestion_fee")?.null_count(), 2);
        Ok(())
    }

    #[test]
    fn test_prepare_for_load_reports_missing_fields() -> anyhow::Result<()> {
        let df = source_frame().drop("payment_type")?;
        let err = prepare_for_load(&df).expect_err("payment_type was dropped");
        let message = err.to_string();
        assert!(message.contains("payment_type"));
        assert!(message.contains(CBD_CONGESTION_FEE));
        Ok(())
    }

    #[test]
    fn test_load_mode_parses_lowercase() -> anyhow::Result<()> {
        let mode: LoadMode = serde_json::from_str("\"production\"")?;
        assert_eq!(mode, LoadMode::Production);
        assert_eq!(LoadMode::default(), LoadMode::Development);
        Ok(())
    }
}
