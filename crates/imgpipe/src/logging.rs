//! Process-wide log setup.
//!
//! Library code logs through the `log` facade; this installs a `tracing`
//! subscriber and bridges `log` records into it.

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    Bridge(#[from] log::SetLoggerError),
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns an error when a
/// subscriber is already installed, which callers may ignore.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))?;
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer()))?;
    }

    LogTracer::init()?;
    log::debug!("Logging initialized (level={}, json={})", config.level, config.json);
    Ok(())
}
