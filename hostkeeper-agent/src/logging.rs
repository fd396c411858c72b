//! Logging setup
//!
//! Console output always; a daily rolling file when a log directory is
//! configured. `RUST_LOG` overrides the default filter.

use crate::config::LoggingConfig;
use crate::error::{MonitorError, MonitorResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "hostkeeper_agent=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init(config: &LoggingConfig) -> MonitorResult<Option<WorkerGuard>> {
    let console = fmt::layer().with_target(false).with_filter(env_filter());

    let (file, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|e| {
                MonitorError::Config(format!("cannot create log directory {}: {}", directory.display(), e))
            })?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| MonitorError::Config(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}
