//! Environment variable names used by [`WriterConfig::from_env`] and
//! [`init_logging`].
//!
//! These are purely helpers; the writer types themselves never read the
//! environment.
//!
//! [`WriterConfig::from_env`]: crate::config::WriterConfig::from_env
//! [`init_logging`]: crate::init::init_logging

/// Allowed share of failed records, `0.0` to `1.0`.
pub const BATCH_WRITER_FAILURE_RATIO_ENV: &str = "BATCH_WRITER_FAILURE_ALLOWANCE_RATIO";

/// `true` to resend batches that failed with a transient error.
pub const BATCH_WRITER_RETRIES_ENV: &str = "BATCH_WRITER_RETRIES_ENABLED";

/// Records per batch.
pub const BATCH_WRITER_BATCH_SIZE_ENV: &str = "BATCH_WRITER_BATCH_SIZE";

/// Maximum age of a partial batch, in milliseconds.
pub const BATCH_WRITER_BATCH_TIME_MS_ENV: &str = "BATCH_WRITER_BATCH_TIME_MS";

/// Upper bound on outstanding batches, `0` for none.
pub const BATCH_WRITER_MAX_IN_FLIGHT_ENV: &str = "BATCH_WRITER_MAX_IN_FLIGHT";

/// Sink DSN, e.g. `opensearch://localhost:9200/events`.
pub const BATCH_WRITER_SINK_DSN_ENV: &str = "BATCH_WRITER_SINK_DSN";

/// Log filter directive, e.g. `info` or `batch_sink_writer=debug`.
pub const BATCH_WRITER_LOG_ENV: &str = "BATCH_WRITER_LOG";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
