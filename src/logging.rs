//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{ConfigError, LoggingConfig};

/// Filter for `level`, unless `RUST_LOG` is set.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{level},ollachat={level}")))
}

/// Install the global subscriber: stderr always, plus daily rolling files
/// under `log_dir` when configured.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "ollachat.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The writer must live as long as the process.
            std::mem::forget(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    Registry::default()
        .with(env_filter(&config.level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(format!("already initialized: {e}")))?;

    tracing::info!("Logging initialized with level: {}", config.level);
    if let Some(dir) = &config.log_dir {
        tracing::info!("Log files will be saved to: {}/ollachat.log.YYYY-MM-DD", dir.display());
    }
    Ok(())
}
