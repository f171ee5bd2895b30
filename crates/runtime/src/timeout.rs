//! Per-target call timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use steward_core::TargetKind;

/// Deadline for one call, by target kind. Operations may override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// `kubectl` calls.
    #[serde(with = "humantime_serde")]
    pub cluster_api: Duration,
    /// `etcdctl` calls.
    #[serde(with = "humantime_serde")]
    pub etcd: Duration,
    /// Host commands.
    #[serde(with = "humantime_serde")]
    pub host: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            cluster_api: Duration::from_secs(30),
            etcd: Duration::from_secs(60),
            host: Duration::from_secs(120),
        }
    }
}

impl TimeoutConfig {
    /// The same deadline for every kind.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            cluster_api: timeout,
            etcd: timeout,
            host: timeout,
        }
    }

    /// Default deadline for `kind`.
    pub fn for_kind(&self, kind: TargetKind) -> Duration {
        match kind {
            TargetKind::ClusterApi => self.cluster_api,
            TargetKind::Etcd => self.etcd,
            TargetKind::Host => self.host,
        }
    }

    /// Deadline for an operation: its own override, else the kind default.
    pub fn resolve(&self, kind: TargetKind, operation_override: Option<Duration>) -> Duration {
        operation_override.unwrap_or_else(|| self.for_kind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_per_kind() {
        let config = TimeoutConfig::default();
        assert_eq!(config.for_kind(TargetKind::ClusterApi), Duration::from_secs(30));
        assert_eq!(config.for_kind(TargetKind::Etcd), Duration::from_secs(60));
        assert_eq!(config.for_kind(TargetKind::Host), Duration::from_secs(120));
    }

    #[test]
    fn operation_override_wins() {
        let config = TimeoutConfig::default();
        assert_eq!(
            config.resolve(TargetKind::Host, Some(Duration::from_secs(900))),
            Duration::from_secs(900)
        );
        assert_eq!(config.resolve(TargetKind::Host, None), Duration::from_secs(120));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: TimeoutConfig = serde_json::from_str(r#"{"etcd":"2m"}"#).unwrap();
        assert_eq!(config.etcd, Duration::from_secs(120));
        assert_eq!(config.cluster_api, Duration::from_secs(30));
    }
}
