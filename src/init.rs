use crate::env::{env_or, BATCH_WRITER_LOG_ENV};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Конфигурация логирования.
///
/// **Поля**
/// - `filter`: директивы в формате `EnvFilter`, например
///   `"info,batch_sink_writer=debug"`.
/// - `ansi`: раскрашивать ли вывод в консоль.
/// - `with_target`: печатать ли target (модуль) события.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub filter: String,
    pub ansi: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Default config with the filter taken from `BATCH_WRITER_LOG`, then
    /// `RUST_LOG`, then `"info"`.
    pub fn from_env() -> Self {
        let fallback = env_or("RUST_LOG", "info");
        Self {
            filter: env_or(BATCH_WRITER_LOG_ENV, &fallback),
            ..Self::default()
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install a global `tracing` subscriber built from [`LoggingConfig`].
///
/// **Effects**
///
/// Installs a [`Registry`] with an [`EnvFilter`] and a `fmt` layer as the
/// global default subscriber. Calling it a second time in the same process
/// returns [`InitError::AlreadyInitialized`] and leaves the first
/// subscriber in place.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<(), InitError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| InitError::Filter {
        filter: config.filter.clone(),
        reason: e.to_string(),
    })?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.with_target);
    let subscriber = Registry::default().with(filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|_| InitError::AlreadyInitialized)
}

/// Initialize logging with [`LoggingConfig::from_env`].
///
/// This is the recommended entrypoint for binaries embedding the writer.
pub fn init_logging() -> Result<(), InitError> {
    init_logging_with_config(LoggingConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_reported() {
        let err = init_logging_with_config(LoggingConfig {
            filter: "batch_sink_writer=notalevel".to_string(),
            ..LoggingConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, InitError::Filter { .. }), "{err}");
    }

    #[test]
    fn second_install_is_rejected() {
        // Первый вызов может проиграть другому тесту в этом же процессе,
        // поэтому проверяем только второй.
        let _ = init_logging_with_config(LoggingConfig::default());
        let err = init_logging_with_config(LoggingConfig::default()).unwrap_err();
        assert!(matches!(err, InitError::AlreadyInitialized));
    }
}
