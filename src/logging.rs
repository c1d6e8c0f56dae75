//! Logging setup for the ETL binary.
//!
//! Events go to the console and to two daily-rotated files in the platform
//! data directory: `taxi_etl.<date>.log` with everything that passes the
//! filter, and `error.<date>.log` with warnings and errors only. A failed
//! download or a rejected file is therefore easy to find after a long batch.
//!
//! ```no_run
//! taxi_etl::logging::init("info").expect("Failed to initialize logging");
//! tracing::info!("Batch started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "taxi_etl";
const LOG_PREFIX: &str = "taxi_etl";

fn log_dir_in(base_dir: &Path) -> PathBuf {
    base_dir.join(APP_DIR).join("logs")
}

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/taxi_etl/logs`
/// - macOS: `~/Library/Application Support/taxi_etl/logs`
/// - Linux: `~/.local/share/taxi_etl/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = log_dir_in(&base_dir);

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn rolling(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

/// Initializes console and file logging.
///
/// `default_level` applies when `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or the file appenders fail.
pub fn init(default_level: &str) -> Result<()> {
    let log_dir = get_log_dir()?;
    let all_logs_appender = rolling(&log_dir, LOG_PREFIX)?;
    let error_logs_appender = rolling(&log_dir, "error")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Failed to create env filter")?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_line_number(false)
        .compact();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .init();

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}

/// Console-only logging, for hosts without a writable data directory.
pub fn init_console(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
}

/// Gets the path to the current log file
pub fn get_current_log_path() -> Result<PathBuf> {
    let log_dir = get_log_dir()?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{LOG_PREFIX}.{today}.log")))
}
