//! Logging utilities and configuration for replica-guard.
//!
//! The engine logs through `tracing`. [`LogConfig`] controls how much query
//! text ends up in the logs; [`setup`] installs a `tracing-subscriber`
//! pipeline for binaries.

use tracing::Level;

/// Logging configuration for validation runs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log the SQL text sent to each backend (at debug level)
    pub log_queries: bool,
    /// Maximum length for logged field values (to prevent huge logs)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_queries: false,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            log_queries: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration for production with lowest overhead.
    pub fn production() -> Self {
        Self {
            log_queries: false,
            max_field_length: 128,
        }
    }

    /// Picks the preset matching the subscriber's level for replica-guard.
    ///
    /// Query text is only worth keeping when debug events are emitted.
    pub fn for_level(level: Level) -> Self {
        if level >= Level::DEBUG {
            Self::verbose()
        } else if level <= Level::WARN {
            Self::production()
        } else {
            Self::default()
        }
    }
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Utilities for setting up structured logging.
pub mod setup {
    use tracing::Level;

    /// Configuration for the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for everything outside replica-guard
        pub level: Level,
        /// Log level for replica-guard components specifically
        pub guard_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::WARN,
                guard_level: Level::INFO,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// Creates a configuration for pipeline runs: JSON lines, info level.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                guard_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        /// Creates a configuration for development use.
        pub fn development() -> Self {
            Self {
                level: Level::INFO,
                guard_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        /// Sets the log level for replica-guard components.
        pub fn with_guard_level(mut self, level: Level) -> Self {
            self.guard_level = level;
            self
        }

        /// Sets a custom environment filter.
        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            if let Some(ref filter) = self.env_filter {
                filter.clone()
            } else {
                format!(
                    "{},replica_guard={}",
                    self.level.as_str().to_lowercase(),
                    self.guard_level.as_str().to_lowercase()
                )
            }
        }
    }

    /// Installs the global subscriber. Logs go to stderr so reports on
    /// stdout stay machine-readable.
    ///
    /// `RUST_LOG` takes precedence over the configured filter.
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::setup::LoggingConfig;
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert!(!config.log_queries);
        assert_eq!(config.max_field_length, 256);
    }

    #[test]
    fn test_log_config_for_level() {
        assert!(LogConfig::for_level(Level::TRACE).log_queries);
        assert!(LogConfig::for_level(Level::DEBUG).log_queries);

        let info = LogConfig::for_level(Level::INFO);
        assert!(!info.log_queries);
        assert_eq!(info.max_field_length, 256);

        let warn = LogConfig::for_level(Level::WARN);
        assert!(!warn.log_queries);
        assert_eq!(warn.max_field_length, 128);
        assert_eq!(LogConfig::for_level(Level::ERROR).max_field_length, 128);
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("hello", 10), "hello");
        assert_eq!(
            truncate_field("this is a very long text that should be truncated", 10),
            "this is a ...(truncated)"
        );
        // never splits a multi-byte character
        assert_eq!(truncate_field("ééé", 3), "é...(truncated)");
    }

    #[test]
    fn test_env_filter_string() {
        let config = LoggingConfig::development();
        assert_eq!(config.env_filter(), "info,replica_guard=debug");

        let config = LoggingConfig::default().with_env_filter("replica_guard=trace");
        assert_eq!(config.env_filter(), "replica_guard=trace");
    }

    #[test]
    fn test_production_preset_emits_json() {
        let config = LoggingConfig::production().with_guard_level(Level::WARN);
        assert!(config.json_format);
        assert_eq!(config.env_filter(), "warn,replica_guard=warn");
    }
}
