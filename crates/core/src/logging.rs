//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter directives used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,cobalt=debug";

/// Settings for the process-wide `tracing` subscriber.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Filter directives applied when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
    /// Include the emitting thread id in each line.
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            with_target: true,
            with_thread_ids: true,
        }
    }
}

impl LoggingConfig {
    /// Builds the filter, preferring `RUST_LOG` over the configured default.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (`RUST_LOG`, falling back to `info,cobalt=debug`)
/// - Targets and thread ids on every line, which matters once several
///   threads record command lists in the same frame
///
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
/// ```
/// cobalt_core::init_logging();
/// tracing::info!("Device initialized");
/// ```
pub fn init_logging() {
    init_logging_with(&LoggingConfig::default());
}

/// Initialize the logging system with explicit settings.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging_with(config: &LoggingConfig) -> bool {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(
            fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.default_filter, DEFAULT_FILTER);
        assert!(config.with_target);
        assert!(config.with_thread_ids);
    }

    #[test]
    fn test_second_init_is_ignored() {
        init_logging();
        assert!(!init_logging_with(&LoggingConfig::default()));
    }
}
