//! Tracing setup and log retention.
//!
//! Diagnostics go to stderr, filtered by `RUST_LOG`. Commands that run a
//! long interactive session also write a JSON log to
//! `.skye/logs/<command>/<YYYYMMDD_HHMMSS>.log`, which defaults to `info`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use skye_core::config::SKYE_DIR;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log files older than this many days are removed on startup.
const LOG_RETENTION_DAYS: u64 = 3;

/// Install the global subscriber.
///
/// With `command` set, a JSON file layer is added next to stderr. The
/// returned guard flushes the file writer on drop and must outlive the
/// program's logging.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(project: &Path, command: Option<&str>) -> Result<Option<WorkerGuard>> {
    match build_tracing(project, command)? {
        Some((subscriber, guard)) => {
            subscriber.init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            Ok(None)
        }
    }
}

fn build_tracing(
    project: &Path,
    command: Option<&str>,
) -> Result<Option<(impl tracing::Subscriber + Send + Sync, WorkerGuard)>> {
    let Some(command) = command else {
        return Ok(None);
    };

    let (writer, guard) = open_log_writer(project, command)?;
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(file_filter),
        );

    Ok(Some((subscriber, guard)))
}

fn open_log_writer(project: &Path, command: &str) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(project, command, SystemTime::now());
    let log_dir = log_path
        .parent()
        .with_context(|| format!("log path has no parent: {}", log_path.display()))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;
    let file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(file))
}

fn logs_dir(project: &Path) -> PathBuf {
    project.join(SKYE_DIR).join("logs")
}

fn build_log_path(project: &Path, command: &str, now: SystemTime) -> PathBuf {
    logs_dir(project)
        .join(command)
        .join(format!("{}.log", format_utc_timestamp(now)))
}

/// Delete `.log` files past retention under `.skye/logs/`, then prune
/// directories left empty.
///
/// Runs before tracing is installed, so problems are reported with
/// `eprintln!` and never abort startup.
pub fn cleanup_old_logs(project: &Path) {
    let dir = logs_dir(project);
    if !dir.is_dir() {
        return;
    }

    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(&dir, cutoff);
    remove_empty_dirs(&dir);
}

/// `YYYYMMDD_HHMMSS` in UTC.
fn format_utc_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;

    format!(
        "{year:04}{month:02}{day:02}_{:02}{:02}{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Gregorian (year, month, day) for a day count since 1970-01-01.
///
/// Howard Hinnant's `civil_from_days`, with eras starting on March 1st.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);

    (year as u64, month, day)
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: cannot read log directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) if modified < cutoff => {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("warning: cannot remove old log {}: {e}", path.display());
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("warning: cannot stat {}: {e}", path.display()),
        }
    }
}

/// Prune empty subdirectories of `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            remove_empty_dirs(&path);
            // fails while non-empty
            let _ = fs::remove_dir(&path);
        }
    }
}
