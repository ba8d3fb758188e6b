//! Tracing setup for a verification run.
//!
//! Every run writes its own log file, named after the start time and process
//! id, alongside the stdout stream a CI job captures. `RUST_LOG` replaces the
//! default directives, which keep the HTTP and TLS crates quiet.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use time::{
    OffsetDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, FormatItem},
    macros::format_description,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs;

const LOG_FILE_PREFIX: &str = "quast-verify";
const LOG_FILE_SUFFIX: &str = ".log";
const DEFAULT_DIRECTIVES: &str = "info,ureq=warn,rustls=warn";
const VERBOSE_DIRECTIVES: &str = "debug,ureq=info,rustls=warn";

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Directory for run logs; the application logs dir when unset.
    pub dir: Option<PathBuf>,
    /// Log service calls and archive handling at debug level.
    pub verbose: bool,
    /// Number of run logs kept after pruning, including the current one.
    pub keep: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            verbose: false,
            keep: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to resolve log directory: {0}")]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Failed to prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove old run log {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format run log name: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("Failed to install tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// The installed run log. Buffered lines are flushed when this is dropped.
#[must_use = "dropping the run log stops file logging"]
pub struct RunLog {
    path: PathBuf,
    _guard: WorkerGuard,
}

impl RunLog {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(settings: &LogSettings) -> Result<RunLog, LoggingError> {
    let dir = match &settings.dir {
        Some(dir) => dir.clone(),
        None => app_dirs::logs_dir()?,
    };
    let logs = RunLogs::open(dir, settings.keep)?;
    let path = logs.create(&run_log_name(now_local_or_utc(), std::process::id())?)?;
    let removed = logs.prune(&path)?;

    let file = OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::Prepare {
            path: path.clone(),
            source,
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let timer = timer();
    let subscriber = Registry::default()
        .with(filter(settings.verbose)?)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_timer(timer.clone())
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(path = %path.display(), pruned = removed, "Run log opened");
    Ok(RunLog {
        path,
        _guard: guard,
    })
}

/// Run log files in one directory, oldest first by name.
struct RunLogs {
    dir: PathBuf,
    keep: usize,
}

impl RunLogs {
    fn open(dir: PathBuf, keep: usize) -> Result<Self, LoggingError> {
        fs::create_dir_all(&dir).map_err(|source| LoggingError::Prepare {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            keep: keep.max(1),
        })
    }

    fn create(&self, name: &str) -> Result<PathBuf, LoggingError> {
        let path = self.dir.join(name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LoggingError::Prepare {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Names sort by start time, so the oldest go first. `current` is never removed.
    fn prune(&self, current: &Path) -> Result<usize, LoggingError> {
        let mut runs: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|source| LoggingError::ReadDir {
                path: self.dir.clone(),
                source,
            })?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_run_log(path))
            .collect();
        runs.sort();

        let excess = runs.len().saturating_sub(self.keep);
        let mut removed = 0;
        for path in runs.into_iter().filter(|path| path != current).take(excess) {
            fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn is_run_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX))
}

fn run_log_name(started: OffsetDateTime, pid: u32) -> Result<String, LoggingError> {
    const NAME: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!(
        "{LOG_FILE_PREFIX}_{}_{pid}{LOG_FILE_SUFFIX}",
        started.format(NAME)?
    ))
}

fn filter(verbose: bool) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = if verbose {
        VERBOSE_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    };
    Ok(EnvFilter::try_new(directives)?)
}

fn timer() -> fmt::time::OffsetTime<BorrowedFormatItem<'static>> {
    const DISPLAY: &[FormatItem<'static>] =
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
