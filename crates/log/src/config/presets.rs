//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

impl Config {
    /// Defaults overridden by `STEWARD_LOG` (or `RUST_LOG`) and
    /// `STEWARD_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("STEWARD_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Some(format) = std::env::var("STEWARD_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            config.format = format;
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.display.colors = false;
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_owned(),
            format: Format::Pretty,
            display: DisplayConfig {
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Agent configuration: JSON lines for the node's log collector.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_owned(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}
