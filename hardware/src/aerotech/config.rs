//! Connection configuration for an Ensemble controller.
//!
//! A deployment describes its controller with an [`EnsembleConfig`], either
//! built in code, loaded from a JSON file, or assembled from command-line
//! arguments via [`EnsembleArgs`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ascii::FEED_RATE_RESOLUTION;

/// Default Ensemble ASCII interface port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default controller address.
pub const DEFAULT_STAGE_IP: &str = "localhost";

/// Default feed rate appended to move commands (`XF10.0`).
pub const DEFAULT_FEED_RATE: f64 = 10.0;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;

/// Feed rates below this encode as `XF0.0`.
const MIN_FEED_RATE: f64 = FEED_RATE_RESOLUTION / 2.0;

/// Homing and long moves hold the response until motion is done.
const DEFAULT_IO_TIMEOUT_MS: u64 = 10_000;

/// Errors loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Endpoint and timing parameters for one Ensemble controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Controller host name or IP address
    pub host: String,
    /// Controller TCP port
    pub port: u16,
    /// Time allowed to establish each connection, in milliseconds
    pub connect_timeout_ms: u64,
    /// Time allowed for each send and each receive, in milliseconds
    pub io_timeout_ms: u64,
    /// Feed rate appended to move commands
    pub feed_rate: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STAGE_IP.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            feed_rate: DEFAULT_FEED_RATE,
        }
    }
}

impl EnsembleConfig {
    /// Configuration for `host:port` with default timeouts and feed rate.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string used for connecting and in log messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Set both timeouts. Sub-millisecond remainders round up, so only a
    /// zero duration gives a zero (invalid) timeout.
    pub fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout_ms = ceil_millis(connect);
        self.io_timeout_ms = ceil_millis(io);
        self
    }

    pub fn with_feed_rate(mut self, feed_rate: f64) -> Self {
        self.feed_rate = feed_rate;
        self
    }

    /// Check the values a controller connection depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        // Zero would disable the socket timeout entirely
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be non-zero".to_string(),
            ));
        }
        if !self.feed_rate.is_finite() || self.feed_rate < MIN_FEED_RATE {
            return Err(ConfigError::Invalid(format!(
                "feed rate must be at least {MIN_FEED_RATE}, got {}",
                self.feed_rate
            )));
        }
        Ok(())
    }

    /// Load and validate from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Command-line arguments for the stage controller connection.
///
/// Use with `#[command(flatten)]` in your CLI args struct. Values given on
/// the command line override those loaded from `--stage-config`.
#[derive(Args, Debug, Clone)]
pub struct EnsembleArgs {
    /// Ensemble controller IP address or host name.
    #[arg(long, help = "Ensemble controller IP address or host name")]
    pub stage_ip: Option<String>,

    /// Ensemble ASCII interface port.
    #[arg(long, help = "Ensemble ASCII interface port (default 8000)")]
    pub stage_port: Option<u16>,

    /// JSON file with an EnsembleConfig.
    #[arg(
        long,
        help = "JSON file describing the controller connection",
        long_help = "Path to a JSON file with host, port, connect_timeout_ms, io_timeout_ms \
            and feed_rate. Missing fields take their defaults; other stage flags override \
            values from the file."
    )]
    pub stage_config: Option<PathBuf>,

    /// Feed rate for move commands.
    #[arg(long, help = "Feed rate appended to move commands (default 10.0)")]
    pub feed_rate: Option<f64>,

    /// Connect timeout in milliseconds.
    #[arg(long, help = "Connect timeout in milliseconds")]
    pub connect_timeout_ms: Option<u64>,

    /// Send/receive timeout in milliseconds.
    #[arg(long, help = "Send and receive timeout in milliseconds")]
    pub io_timeout_ms: Option<u64>,
}

impl EnsembleArgs {
    /// Build the effective configuration: file (or defaults), then overrides.
    pub fn to_config(&self) -> Result<EnsembleConfig, ConfigError> {
        let mut config = match &self.stage_config {
            Some(path) => EnsembleConfig::load_from_file(path)?,
            None => EnsembleConfig::default(),
        };

        if let Some(host) = &self.stage_ip {
            config.host = host.clone();
        }
        if let Some(port) = self.stage_port {
            config.port = port;
        }
        if let Some(feed_rate) = self.feed_rate {
            config.feed_rate = feed_rate;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.io_timeout_ms {
            config.io_timeout_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn empty_args() -> EnsembleArgs {
        EnsembleArgs {
            stage_ip: None,
            stage_port: None,
            stage_config: None,
            feed_rate: None,
            connect_timeout_ms: None,
            io_timeout_ms: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = EnsembleConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.feed_rate, 10.0);
        assert_eq!(config.endpoint(), "localhost:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let config = EnsembleConfig::new("192.168.1.16", 8001).with_feed_rate(2.5);

        config.save_to_file(file.path()).unwrap();
        let loaded = EnsembleConfig::load_from_file(file.path()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"host": "10.0.0.5"}"#).unwrap();

        let loaded = EnsembleConfig::load_from_file(file.path()).unwrap();

        assert_eq!(loaded.host, "10.0.0.5");
        assert_eq!(loaded.port, DEFAULT_PORT);
        assert_eq!(loaded.io_timeout(), Duration::from_millis(DEFAULT_IO_TIMEOUT_MS));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EnsembleConfig::new("", 8000).validate().is_err());
        assert!(EnsembleConfig::new("host", 0).validate().is_err());
        assert!(EnsembleConfig::new("host", 8000)
            .with_feed_rate(-1.0)
            .validate()
            .is_err());
        assert!(EnsembleConfig::new("host", 8000)
            .with_timeouts(Duration::ZERO, Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_feed_rate_must_survive_encoding() {
        // 0.04 would be written as XF0.0
        for feed_rate in [0.04, 0.0, f64::NAN, f64::INFINITY] {
            assert!(
                EnsembleConfig::new("host", 8000)
                    .with_feed_rate(feed_rate)
                    .validate()
                    .is_err(),
                "{feed_rate} accepted"
            );
        }
        assert!(EnsembleConfig::new("host", 8000)
            .with_feed_rate(0.1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_sub_millisecond_timeouts_round_up() {
        let config = EnsembleConfig::new("host", 8000)
            .with_timeouts(Duration::from_micros(300), Duration::from_nanos(1));
        assert_eq!(config.connect_timeout_ms, 1);
        assert_eq!(config.io_timeout_ms, 1);
        assert!(config.validate().is_ok());

        let config = EnsembleConfig::new("host", 8000)
            .with_timeouts(Duration::from_micros(1500), Duration::from_secs(2));
        assert_eq!(config.connect_timeout_ms, 2);
        assert_eq!(config.io_timeout_ms, 2000);
    }

    #[test]
    fn test_args_override_file() {
        let file = NamedTempFile::new().unwrap();
        EnsembleConfig::new("10.0.0.5", 8001)
            .save_to_file(file.path())
            .unwrap();

        let args = EnsembleArgs {
            stage_config: Some(file.path().to_path_buf()),
            stage_port: Some(9000),
            ..empty_args()
        };
        let config = args.to_config().unwrap();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_args_without_file() {
        let args = EnsembleArgs {
            stage_ip: Some("stage-host".to_string()),
            ..empty_args()
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.endpoint(), "stage-host:8000");
    }
}
