//! Maintenance task descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use steward_core::Params;
use steward_core::constants::{LABEL_CONTROL_PLANE, LABEL_MASTER};

use crate::error::PlanError;

/// The built-in kinds of maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Cordon and drain a node.
    DrainNode,
    /// Upgrade the Kubernetes components of a node.
    UpgradeNode,
    /// Take and verify an etcd snapshot.
    EtcdSnapshot,
}

impl TaskKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 3] = [Self::DrainNode, Self::UpgradeNode, Self::EtcdSnapshot];

    /// Kebab-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DrainNode => "drain-node",
            Self::UpgradeNode => "upgrade-node",
            Self::EtcdSnapshot => "etcd-snapshot",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PlanError::InvalidTask(format!("unknown task kind `{s}`")))
    }
}

/// Role of a node in the cluster, which selects the upgrade flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Runs workloads only.
    Worker,
    /// Runs the control plane (API server, scheduler, stacked etcd).
    ControlPlane,
}

impl NodeRole {
    /// Detect the role from node labels.
    #[must_use]
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        if labels.contains_key(LABEL_CONTROL_PLANE) || labels.contains_key(LABEL_MASTER) {
            Self::ControlPlane
        } else {
            Self::Worker
        }
    }

    /// Kebab-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::ControlPlane => "control-plane",
        }
    }
}

impl FromStr for NodeRole {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Self::Worker),
            "control-plane" | "master" => Ok(Self::ControlPlane),
            other => Err(PlanError::InvalidTask(format!("unknown node role `{other}`"))),
        }
    }
}

/// A request to perform one maintenance task.
///
/// `params` carries the task inputs. Recognised keys:
///
/// | kind | keys |
/// |---|---|
/// | `drain-node` | `node` |
/// | `upgrade-node` | `node`, `version`, `role`, optional `components` |
/// | `etcd-snapshot` | `member`, `snapshot_name` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
    /// Caller-supplied id, e.g. the `steward.io/operation-id` annotation.
    pub request_id: String,
    /// Which template to expand.
    pub kind: TaskKind,
    /// Task inputs.
    #[serde(default)]
    pub params: Params,
}

impl MaintenanceTask {
    /// New task with no parameters.
    #[must_use]
    pub fn new(request_id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            request_id: request_id.into(),
            kind,
            params: Params::new(),
        }
    }

    /// Builder-style parameter binding.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// A required string input.
    pub fn require_str(&self, name: &str) -> Result<&str, PlanError> {
        self.params
            .get_str(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                PlanError::InvalidTask(format!("{} task requires `{name}`", self.kind))
            })
    }

    /// Optional list input; a comma separated string is split.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.params.get(name) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect(),
            Some(serde_json::Value::String(raw)) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}
