//! Tracing setup for services embedding the engine.
//!
//! Installs a global subscriber that writes to a per-launch file and,
//! optionally, to stdout. Only the newest [`MAX_LOG_FILES`] files are kept.
//!
//! ```
//! use tagwise::logging::{self, LogOptions};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let options = LogOptions {
//!     directory: Some(dir.path().join("logs")),
//!     stdout: false,
//! };
//! let file = logging::init_with(options).unwrap().unwrap();
//! assert!(file.starts_with(dir.path()));
//! tracing::info!("engine starting");
//! ```

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Log files retained per directory, the current one included.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "tagwise";
const LOG_FILE_EXTENSION: &str = "log";
const DEFAULT_FILTER: &str = "info";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Cannot resolve the log directory: {0}")]
    AppDir(#[from] AppDirError),
    #[error("Log file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot name log file: {0}")]
    FormatTime(time::error::Format),
    #[error("A global tracing subscriber is already installed: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

impl LoggingError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where to log and whether to mirror to stdout.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for log files; `None` resolves `<app root>/logs`.
    pub directory: Option<PathBuf>,
    pub stdout: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            directory: None,
            stdout: true,
        }
    }
}

/// [`init_with`] using the app directory and stdout.
pub fn init() -> Result<Option<PathBuf>, LoggingError> {
    init_with(LogOptions::default())
}

/// Install the global subscriber and return the new log file.
///
/// Returns `Ok(None)` when logging is already initialized. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init_with(options: LogOptions) -> Result<Option<PathBuf>, LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(None);
    }

    let log_dir = match options.directory {
        Some(dir) => {
            fs::create_dir_all(&dir).map_err(LoggingError::io(&dir))?;
            dir
        }
        None => app_dirs::logs_dir()?,
    };
    let file_name = log_file_name(now_local_or_utc())?;
    let log_path = log_dir.join(&file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(LoggingError::io(&log_path))?;
    prune_old_logs(&log_dir, MAX_LOG_FILES)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&log_dir, file_name));
    let timer = local_timer();
    let stdout_layer = options
        .stdout
        .then(|| fmt::layer().with_timer(timer.clone()).with_writer(std::io::stdout));
    let subscriber = Registry::default()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        )
        .with(stdout_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Logging to {}", log_path.display());
    Ok(Some(log_path))
}

/// Log files in `dir`, oldest first.
fn log_files(dir: &Path) -> Result<Vec<PathBuf>, LoggingError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(LoggingError::io(dir))?.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != LOG_FILE_EXTENSION) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((modified, path));
    }
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn prune_old_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let files = log_files(dir)?;
    let excess = files.len().saturating_sub(keep);
    for path in &files[..excess] {
        fs::remove_file(path).map_err(LoggingError::io(path))?;
    }
    Ok(())
}

fn log_file_name(started: OffsetDateTime) -> Result<String, LoggingError> {
    const STAMP: &[FormatItem<'_>] =
        format_description!("[year][month][day]T[hour][minute][second]");
    let stamp = started.format(STAMP).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{stamp}.{LOG_FILE_EXTENSION}"))
}

fn local_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const EVENT_TIME: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, EVENT_TIME.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
