//! Tracing initialization.
//!
//! `RUST_LOG` takes precedence over the configured level, so
//! `RUST_LOG=bbfe_bridge=debug` shows every request and answer on the wire.

use crate::config::BridgeConfig;
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Build the filter: `RUST_LOG` if set, otherwise `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Build a stderr subscriber without installing it.
pub fn subscriber(level: &str, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt().with_env_filter(env_filter(level)).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => Box::new(builder.finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(level: &str, format: LogFormat) -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(subscriber(level, format))
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Install the global subscriber at the configured level.
pub fn init_from_config(config: &BridgeConfig, format: LogFormat) -> anyhow::Result<()> {
    init(&config.application.log_level, format)
}
