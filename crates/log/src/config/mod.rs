//! Configuration types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod presets;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directives (e.g., "info", "steward_engine=debug,info")
    pub level: String,

    /// Output format
    pub format: Format,

    /// Output destination
    pub writer: WriterConfig,

    /// Display configuration
    pub display: DisplayConfig,

    /// Fields recorded on the root span of the process
    pub fields: Fields,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable, multi-line
    Pretty,
    /// Compact single-line output
    Compact,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}` (pretty, compact, json)")),
        }
    }
}

/// Output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterConfig {
    /// Write to stderr
    Stderr,
    /// Write to stdout
    Stdout,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use ANSI colors
    pub colors: bool,
    /// Show target module
    pub target: bool,
    /// Show source location (file:line)
    pub source: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Include the span list in JSON events
    pub span_list: bool,
    /// Put event fields at the top level of JSON events
    pub flatten: bool,
}

/// Fields attached to every event through the root span
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    /// Service name
    pub service: Option<String>,
    /// Node this process runs on
    pub node: Option<String>,
    /// Version
    pub version: Option<String>,
    /// Anything else, rendered into the root span's `extra` field
    #[serde(flatten)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: Format::Compact,
            writer: WriterConfig::Stderr,
            display: DisplayConfig::default(),
            fields: Fields::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            target: true,
            source: false,
            thread_ids: false,
            span_list: true,
            flatten: false,
        }
    }
}

impl Fields {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.node.is_none()
            && self.version.is_none()
            && self.custom.is_empty()
    }
}
