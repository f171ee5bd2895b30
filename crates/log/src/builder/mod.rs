//! Logger builder implementation

#[macro_use]
mod format;

use std::io;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, WriterConfig};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the root span entered for the life of the process
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span_guard: Option<tracing::span::EnteredSpan>,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parse the filter directives without installing anything.
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Install the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - Another global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;
        let writer = match self.config.writer {
            WriterConfig::Stderr => BoxMakeWriter::new(io::stderr),
            WriterConfig::Stdout => BoxMakeWriter::new(io::stdout),
        };
        let display = &self.config.display;
        let registry = Registry::default().with(filter);

        let installed = match self.config.format {
            Format::Pretty => registry
                .with(create_fmt_layer!(pretty, display, writer))
                .try_init(),
            Format::Compact => registry
                .with(create_fmt_layer!(compact, display, writer))
                .try_init(),
            Format::Json => registry.with(create_json_layer!(display, writer)).try_init(),
        };
        installed.map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        let fields = &self.config.fields;
        let root = (!fields.is_empty()).then(|| {
            let extra = (!fields.custom.is_empty())
                .then(|| serde_json::to_string(&fields.custom).unwrap_or_default());
            tracing::info_span!(
                "steward",
                service = fields.service.as_deref().unwrap_or(""),
                node = fields.node.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or(""),
                extra = extra.as_deref().unwrap_or(""),
            )
            .entered()
        });

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "logger installed"
        );
        Ok(LoggerGuard {
            _root_span_guard: root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_rejected_before_install() {
        let config = Config {
            level: "steward=[".into(),
            ..Config::default()
        };
        let err = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(err, LogError::Filter { .. }));
    }

    #[test]
    fn layered_directives_parse() {
        let config = Config {
            level: "steward_engine=debug,steward_runtime=trace,warn".into(),
            ..Config::default()
        };
        assert!(LoggerBuilder::from_config(config).filter().is_ok());
    }
}
