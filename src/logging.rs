//! Tracing subscriber setup

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level so operators can raise verbosity per target without
/// a config change.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
