//! Recorder Configuration Settings
//!
//! Process configuration loaded from environment variables. Parsing goes
//! through an injectable lookup so tests never touch the process
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::services::supervisor::SupervisorConfig;
use crate::domain::schedule::{DEFAULT_TRADING_WINDOWS, TradingSchedule};
use crate::domain::subscription::{SubscribeRequest, VtSymbolError};

/// Default gateway settings file.
pub const DEFAULT_GATEWAY_SETTINGS: &str = "connect_ctp.json";

/// Default instruments recorded by the worker.
pub const DEFAULT_SYMBOLS: &str = "au2504.SHFE,sc2504.INE";

const ENV_GATEWAY_SETTINGS: &str = "RECORDER_GATEWAY_SETTINGS";
const ENV_SYMBOLS: &str = "RECORDER_SYMBOLS";
const ENV_TRADING_WINDOWS: &str = "RECORDER_TRADING_WINDOWS";
const ENV_POLL_INTERVAL: &str = "RECORDER_POLL_INTERVAL_SECS";
const ENV_GRACE_PERIOD: &str = "RECORDER_GRACE_PERIOD_SECS";
const ENV_LOGIN_TIMEOUT: &str = "RECORDER_LOGIN_TIMEOUT_SECS";
const ENV_FEED_REPLAY: &str = "RECORDER_FEED_REPLAY";
const ENV_REPLAY_PACE: &str = "RECORDER_REPLAY_PACE_MS";
const ENV_EVENT_CAPACITY: &str = "RECORDER_EVENT_CAPACITY";
const ENV_METRICS_PORT: &str = "RECORDER_METRICS_PORT";

/// Replay feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySettings {
    /// Newline-delimited JSON file of raw pushes.
    pub path: Option<PathBuf>,
    /// Delay between pushes (zero = as fast as possible).
    pub pace: Duration,
}

/// Complete recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Path to the JSON gateway settings file.
    pub gateway_settings: PathBuf,
    /// Instruments to subscribe.
    pub symbols: Vec<SubscribeRequest>,
    /// Windows during which the worker runs.
    pub schedule: TradingSchedule,
    /// Supervisor timing.
    pub supervisor: SupervisorConfig,
    /// Time the worker waits for login before giving up.
    pub login_timeout: Duration,
    /// Replay feed settings.
    pub replay: ReplaySettings,
    /// Event bus channel capacity.
    pub event_capacity: usize,
    /// Prometheus listener port (0 = disabled).
    pub metrics_port: u16,
}

impl RecorderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gateway_settings = match lookup(ENV_GATEWAY_SETTINGS) {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(ENV_GATEWAY_SETTINGS.to_string()));
            }
            Some(path) => PathBuf::from(path.trim()),
            None => PathBuf::from(DEFAULT_GATEWAY_SETTINGS),
        };

        let symbols = parse_symbols(lookup(ENV_SYMBOLS).as_deref().unwrap_or(DEFAULT_SYMBOLS))?;

        let windows = lookup(ENV_TRADING_WINDOWS);
        let schedule = windows
            .as_deref()
            .unwrap_or(DEFAULT_TRADING_WINDOWS)
            .parse::<TradingSchedule>()
            .map_err(|e| ConfigError::InvalidValue {
                key: ENV_TRADING_WINDOWS.to_string(),
                reason: e.to_string(),
            })?;

        let defaults = SupervisorConfig::default();
        let supervisor = SupervisorConfig {
            poll_interval: parse_duration_secs(&lookup, ENV_POLL_INTERVAL, defaults.poll_interval),
            grace_period: parse_duration_secs(&lookup, ENV_GRACE_PERIOD, defaults.grace_period),
        };
        if supervisor.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: ENV_POLL_INTERVAL.to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        let replay = ReplaySettings {
            path: lookup(ENV_FEED_REPLAY)
                .filter(|path| !path.trim().is_empty())
                .map(|path| PathBuf::from(path.trim())),
            pace: parse_duration_millis(&lookup, ENV_REPLAY_PACE, Duration::ZERO),
        };

        Ok(Self {
            gateway_settings,
            symbols,
            schedule,
            supervisor,
            login_timeout: parse_duration_secs(
                &lookup,
                ENV_LOGIN_TIMEOUT,
                Duration::from_secs(20),
            ),
            replay,
            event_capacity: parse_usize(&lookup, ENV_EVENT_CAPACITY, 4096).max(1),
            metrics_port: parse_u16(&lookup, ENV_METRICS_PORT, 0),
        })
    }

    /// Replay file the worker reads from.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if no replay file is configured.
    pub fn replay_path(&self) -> Result<&Path, ConfigError> {
        self.replay
            .path
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_FEED_REPLAY.to_string()))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable cannot be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },
    /// The gateway settings file cannot be read.
    #[error("failed to read gateway settings {path}: {source}")]
    ReadSettings {
        /// File path.
        path: PathBuf,
        /// I/O error.
        source: std::io::Error,
    },
    /// The gateway settings file is not valid JSON.
    #[error("failed to parse gateway settings {path}: {source}")]
    ParseSettings {
        /// File path.
        path: PathBuf,
        /// JSON error.
        source: serde_json::Error,
    },
}

fn parse_symbols(value: &str) -> Result<Vec<SubscribeRequest>, ConfigError> {
    let symbols = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|e: VtSymbolError| {
                ConfigError::InvalidValue {
                    key: ENV_SYMBOLS.to_string(),
                    reason: format!("{s}: {e}"),
                }
            })
        })
        .collect::<Result<Vec<SubscribeRequest>, _>>()?;

    if symbols.is_empty() {
        return Err(ConfigError::EmptyValue(ENV_SYMBOLS.to_string()));
    }
    Ok(symbols)
}

fn parse_u16(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
