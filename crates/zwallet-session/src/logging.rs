//! Logging setup

use crate::{Error, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zwallet_params::LogConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. Fails if a subscriber is already
/// installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Logging(format!("invalid filter {:?}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(config.thread_ids);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Logging(e.to_string()))?;

    info!(
        event = "logging_initialized",
        level = %config.level,
        json = config.json,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig {
            level: "debug".to_string(),
            json: true,
            thread_ids: true,
        };
        // First call may lose to another test in this binary
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(Error::Logging(_))));
    }
}
