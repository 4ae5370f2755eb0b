//! Logging setup for rank and launcher processes
//!
//! Every rank logs to stderr; each record carries the rank so interleaved
//! output from a group stays readable. An optional per-rank log file is
//! written through a non-blocking appender.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// What to log and where
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log to stderr
    pub console_enabled: bool,
    /// Also log to a file
    pub file_enabled: bool,
    /// Path for the log file (default: None, uses `shard_compositor[_rank_N].log`)
    pub file_path: Option<PathBuf>,
    /// JSON lines on stderr instead of compact text
    pub json_format: bool,
    /// Filter used when no environment override is set
    pub default_level: String,
    /// Rank of this process, if it is part of a group
    pub rank: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
            rank: None,
        }
    }
}

impl LogConfig {
    /// Log file used when `file_path` is not set
    pub fn default_file_path(&self) -> PathBuf {
        match self.rank {
            Some(rank) => PathBuf::from(format!("shard_compositor_rank_{}.log", rank)),
            None => PathBuf::from("shard_compositor.log"),
        }
    }
}

/// Install the global subscriber for this process.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
///
/// `COMPOSITOR_LOG` overrides the level filter (falling back to `RUST_LOG`,
/// then `default_level`), and `COMPOSITOR_LOG_FORMAT=json` switches the
/// console to one JSON object per line so output from many ranks can be
/// merged and sorted.
///
/// ```no_run
/// use shard_compositor::telemetry::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig { rank: Some(0), ..LogConfig::default() });
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env("COMPOSITOR_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = match std::env::var("COMPOSITOR_LOG_FORMAT") {
        Ok(format) => format.eq_ignore_ascii_case("json"),
        Err(_) => config.json_format,
    };

    let (file_layer, file_guard, log_path) = if config.file_enabled {
        let path = config.file_path.clone().unwrap_or_else(|| config.default_file_path());
        let (writer, guard) = tracing_appender::non_blocking(std::fs::File::create(&path)?);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), Some(guard), Some(path))
    } else {
        (None, None, None)
    };

    let json_layer = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let compact_layer = (config.console_enabled && !use_json)
        .then(|| fmt::layer().compact().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()?;

    if let Some(path) = &log_path {
        eprintln!("Logging to file: {}", path.display());
    }

    tracing::info!(
        target: "shard_compositor",
        version = env!("CARGO_PKG_VERSION"),
        rank = ?config.rank,
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
