use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::env::{
    env_or, BATCH_WRITER_BATCH_SIZE_ENV, BATCH_WRITER_BATCH_TIME_MS_ENV,
    BATCH_WRITER_FAILURE_RATIO_ENV, BATCH_WRITER_MAX_IN_FLIGHT_ENV, BATCH_WRITER_RETRIES_ENV,
    BATCH_WRITER_SINK_DSN_ENV,
};

/// Settings of one write job. Immutable once handed to the manager.
///
/// **Fields**
/// - `failure_allowance_ratio`: largest tolerated `failed / completed`
///   share; `0.0` aborts on the first failed record.
/// - `retries_enabled`: resend a batch once after a transient failure.
/// - `batch_size_threshold`: records per batch.
/// - `batch_time_threshold_ms`: maximum age of a partial batch.
/// - `max_in_flight_batches`: outstanding batches before `write` waits;
///   `0` disables the bound.
/// - `sink_dsn`: backend selection, see [`parse_dsn`](crate::backend::parse_dsn).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub failure_allowance_ratio: f64,
    pub retries_enabled: bool,
    pub batch_size_threshold: usize,
    pub batch_time_threshold_ms: u64,
    pub max_in_flight_batches: usize,
    pub sink_dsn: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            failure_allowance_ratio: 0.0,
            retries_enabled: false,
            batch_size_threshold: 128,
            batch_time_threshold_ms: 1_000,
            max_in_flight_batches: 16,
            sink_dsn: None,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.failure_allowance_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidRatio(ratio));
        }
        if self.batch_size_threshold == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.batch_time_threshold_ms == 0 {
            return Err(ConfigError::ZeroBatchTime);
        }
        Ok(())
    }

    pub fn batch_time_threshold(&self) -> Duration {
        Duration::from_millis(self.batch_time_threshold_ms)
    }

    /// Build a config from `BATCH_WRITER_*` variables, falling back to
    /// [`WriterConfig::default`] for unset ones, and validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = WriterConfig::default();
        let dsn = env_or(BATCH_WRITER_SINK_DSN_ENV, "");
        let config = WriterConfig {
            failure_allowance_ratio: env_parse(
                BATCH_WRITER_FAILURE_RATIO_ENV,
                defaults.failure_allowance_ratio,
            )?,
            retries_enabled: env_parse(BATCH_WRITER_RETRIES_ENV, defaults.retries_enabled)?,
            batch_size_threshold: env_parse(
                BATCH_WRITER_BATCH_SIZE_ENV,
                defaults.batch_size_threshold,
            )?,
            batch_time_threshold_ms: env_parse(
                BATCH_WRITER_BATCH_TIME_MS_ENV,
                defaults.batch_time_threshold_ms,
            )?,
            max_in_flight_batches: env_parse(
                BATCH_WRITER_MAX_IN_FLIGHT_ENV,
                defaults.max_in_flight_batches,
            )?,
            sink_dsn: (!dsn.is_empty()).then_some(dsn),
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<V: FromStr + ToString>(key: &'static str, default: V) -> Result<V, ConfigError> {
    let raw = env_or(key, &default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("failure allowance ratio must be within [0, 1], got {0}")]
    InvalidRatio(f64),

    #[error("batch size threshold must be positive")]
    ZeroBatchSize,

    #[error("batch time threshold must be positive")]
    ZeroBatchTime,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
