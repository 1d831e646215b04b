//! Logging for trak processes.
//!
//! Every trak process on a machine (the interactive CLI and each project's
//! detached watcher) appends to one daily-rolling file under
//! `$XDG_STATE_HOME/trak/`. Each line carries the thread id, and every process
//! opens with a `Logging initialized` event naming its [`ProcessRole`] and pid,
//! so interleaved output can be told apart.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::fmt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self as tracing_fmt, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "trak.log";

/// Which kind of trak process is writing to the shared log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// A user-facing command (`start`, `stop`, `status`, ...).
    Cli,
    /// The background watcher spawned by `start --detach`.
    Daemon,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessRole::Cli => "cli",
            ProcessRole::Daemon => "daemon",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the global subscriber for this process.
///
/// The level comes from `RUST_LOG` when set, else from `config.level`. At most
/// `config.max_files` rotated files are kept. Hold the returned guard until the
/// process exits or buffered lines are lost.
pub fn init(config: &LoggingConfig, role: ProcessRole) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;

    // Watcher callbacks must never wait on disk
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;

    tracing::info!(
        role = %role,
        pid = std::process::id(),
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Flushes pending log lines when dropped.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}
