//! Layered configuration: defaults, TOML file, `STEWARD_*` environment,
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Toml};
use serde::{Deserialize, Serialize};
use steward_core::constants::DEFAULT_JOURNAL_DIR;
use steward_engine::OrchestratorConfig;
use steward_plan::catalog::CatalogConfig;
use steward_plan::template::DEFAULT_SNAPSHOT_DIR;

/// Environment variables with the `STEWARD_` prefix that are not config keys.
const RESERVED_ENV: [&str; 3] = ["config", "log", "log_format"];

/// Everything the `steward` binary can be configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Node managed by `steward agent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Directory holding plan journals.
    pub journal_dir: PathBuf,
    /// How often the agent polls the node's annotations.
    #[serde(with = "humantime_serde")]
    pub reconcile_interval: Duration,
    /// Status endpoint address.
    pub listen: String,
    /// Logger settings.
    pub log: steward_log::Config,
    /// Binary paths, package manager, etcd connection and backup store.
    pub catalog: CatalogConfig,
    /// Backup request ConfigMaps served by the agent.
    pub backup: BackupConfig,
    /// Concurrency, retry and timeout settings.
    pub orchestrator: OrchestratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_name: None,
            journal_dir: PathBuf::from(DEFAULT_JOURNAL_DIR),
            reconcile_interval: Duration::from_secs(30),
            listen: "0.0.0.0:9470".to_owned(),
            log: steward_log::Config::production(),
            catalog: CatalogConfig::default(),
            backup: BackupConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Backup request handling. Uploads happen when `catalog.backup_store` is
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Serve `steward.io/backup=true` ConfigMaps.
    pub enabled: bool,
    /// Namespace of request and status ConfigMaps.
    pub namespace: String,
    /// Directory snapshots are written to.
    pub snapshot_dir: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: "kube-system".to_owned(),
            snapshot_dir: DEFAULT_SNAPSHOT_DIR.to_owned(),
        }
    }
}

/// Values given on the command line; only the ones present override.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(skip_serializing_if = "LogOverrides::is_empty")]
    pub log: LogOverrides,
}

/// Logger flags.
#[derive(Debug, Default, Serialize)]
pub struct LogOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<steward_log::Format>,
}

impl LogOverrides {
    fn is_empty(&self) -> bool {
        self.level.is_none() && self.format.is_none()
    }
}

impl AppConfig {
    /// The layered figment, before extraction.
    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(
                Env::prefixed("STEWARD_")
                    .ignore(&RESERVED_ENV)
                    .split("__"),
            )
            .merge(Serialized::defaults(overrides))
    }

    /// Load and validate the configuration.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        if let Some(path) = file
            && !path.is_file()
        {
            anyhow::bail!("config file {} not found", path.display());
        }
        let config: Self = Self::figment(file, overrides).extract()?;
        config.orchestrator.validate()?;
        if config.reconcile_interval.is_zero() {
            anyhow::bail!("reconcile_interval must be greater than zero");
        }
        Ok(config)
    }
}
