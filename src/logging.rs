//! Logging setup for profilekit
//!
//! Logs go to the console (stderr, so engine output and the final summary on
//! stdout stay clean) and to daily-rotating files in the app data directory.
//!
//! ## Files
//!
//! - `profilekit.<date>.log`: every enabled level
//! - `error.<date>.log`: warnings and errors only
//!
//! ## Usage
//!
//! ```no_run
//! use profilekit::{config::LoggingSettings, logging};
//!
//! let _guards = logging::init(&LoggingSettings::default()).expect("Failed to initialize logging");
//! tracing::info!("Profiling started");
//! ```

use crate::config::{APP_DIR_NAME, LoggingSettings};
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const LOG_FILE_PREFIX: &str = "profilekit";
const ERROR_FILE_PREFIX: &str = "error";

/// Resolves and creates the log directory.
///
/// Uses the configured directory if set, otherwise the platform data directory:
/// - Windows: `%APPDATA%/profilekit/logs`
/// - macOS: `~/Library/Application Support/profilekit/logs`
/// - Linux: `~/.local/share/profilekit/logs`
pub fn get_log_dir(settings: &LoggingSettings) -> Result<PathBuf> {
    let log_dir = match &settings.directory {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .context("Failed to determine data directory")?
            .join(APP_DIR_NAME)
            .join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn rolling_appender(dir: &Path, prefix: &str, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(max_files.max(1))
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the configured level. The returned guards flush the
/// file writers on drop and must be held for the life of the process.
///
/// # Errors
///
/// Returns error if the log directory cannot be created, an appender fails,
/// or a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<Vec<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    if !settings.file_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(Vec::new());
    }

    let log_dir = get_log_dir(settings)?;
    let (all_writer, all_guard) = tracing_appender::non_blocking(rolling_appender(
        &log_dir,
        LOG_FILE_PREFIX,
        settings.max_files,
    )?);
    let (error_writer, error_guard) = tracing_appender::non_blocking(rolling_appender(
        &log_dir,
        ERROR_FILE_PREFIX,
        settings.max_files,
    )?);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_writer);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_writer)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging initialized, log directory: {}", log_dir.display());

    Ok(vec![all_guard, error_guard])
}

/// Path of today's main log file.
pub fn get_current_log_path(settings: &LoggingSettings) -> Result<PathBuf> {
    let log_dir = get_log_dir(settings)?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{LOG_FILE_PREFIX}.{today}.log")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_log_dir_is_created() {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let settings = LoggingSettings {
            directory: Some(tmp.path().join("logs")),
            ..LoggingSettings::default()
        };
        let dir = get_log_dir(&settings).expect("Failed to get log dir");
        assert!(dir.is_dir());

        let current = get_current_log_path(&settings).expect("Failed to build log path");
        let name = current.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("profilekit."));
        assert!(name.ends_with(".log"));
    }
}
