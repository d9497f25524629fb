//! Process-wide tracing setup.
//!
//! Binaries call [`init_tracing`] once at startup. Log output always goes to
//! the console; when a log directory is configured it is also written to a
//! timestamped file in that directory, e.g. `Ensemble_2020_10_21_14_05_09.log`.
//! Domain types such as [`Ensemble`](crate::aerotech::Ensemble) only emit
//! events and never configure logging themselves.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file name prefix.
pub const DEFAULT_LOG_PREFIX: &str = "Ensemble";

/// Default level used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "debug";

/// Where and how verbosely to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Directory for the log file; console only when `None`
    pub directory: Option<PathBuf>,
    /// File name prefix before the timestamp
    pub file_prefix: String,
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: DEFAULT_LOG_PREFIX.to_string(),
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Command-line arguments for log output.
///
/// Use with `#[command(flatten)]` in your CLI args struct.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Directory to write a timestamped log file into.
    #[arg(
        long,
        global = true,
        help = "Directory for a timestamped log file",
        long_help = "Directory to write a timestamped log file into, in addition to the \
            console. Each experiment typically uses its own directory. The directory is \
            created if it does not exist."
    )]
    pub log_dir: Option<PathBuf>,

    /// Log level filter when RUST_LOG is not set.
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}

impl LogArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            directory: self.log_dir.clone(),
            level: self.log_level.clone(),
            ..LogConfig::default()
        }
    }
}

/// File name for a log started at `timestamp`: `<prefix>_%Y_%m_%d_%H_%M_%S.log`.
pub fn log_file_name(prefix: &str, timestamp: &NaiveDateTime) -> String {
    format!("{prefix}_{}.log", timestamp.format("%Y_%m_%d_%H_%M_%S"))
}

/// Install the global tracing subscriber.
///
/// Returns the path of the log file, if one was opened. Fails if the log
/// directory or file cannot be created, or if a subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<Option<PathBuf>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let (file_layer, log_path) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let stamp = chrono::Local::now().naive_local();
            let path = dir.join(log_file_name(&config.file_prefix, &stamp));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(path) = &log_path {
        debug!("Logging to file {}", path.display());
    }
    Ok(log_path)
}
