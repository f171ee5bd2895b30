//! Plan templates: the unexpanded shape of a plan.
//!
//! A template names its steps by key and wires dependencies between keys.
//! The [`PlanBuilder`](crate::PlanBuilder) resolves keys to step indices and
//! operation names to registry entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use steward_core::Params;

use crate::catalog::names::*;
use crate::error::PlanError;
use crate::task::{MaintenanceTask, NodeRole, TaskKind};

/// Directory etcd snapshots are written to unless the task says otherwise.
pub const DEFAULT_SNAPSHOT_DIR: &str = "/var/lib/steward/snapshots";

/// One step of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
    /// Key unique within the template.
    pub key: String,
    /// Registered operation name.
    pub operation: String,
    /// Parameters bound to the operation.
    #[serde(default)]
    pub params: Params,
    /// Keys of the steps that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// An ordered list of template steps.
///
/// Declaration order matters: steps sharing a target lock run in the order
/// they are declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTemplate {
    /// Template name, recorded in the plan.
    pub name: String,
    /// Steps in declaration order.
    pub steps: Vec<TemplateStep>,
}

impl PlanTemplate {
    /// Empty template.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Add a step with explicit dependencies.
    #[must_use]
    pub fn step<I, S>(mut self, key: &str, operation: &str, params: Params, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(TemplateStep {
            key: key.to_owned(),
            operation: operation.to_owned(),
            params,
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a step that depends on the previously declared one.
    #[must_use]
    pub fn then(self, key: &str, operation: &str, params: Params) -> Self {
        let previous: Vec<String> = self.steps.last().map(|s| s.key.clone()).into_iter().collect();
        self.step(key, operation, params, previous)
    }

    /// Key of the last declared step.
    #[must_use]
    pub fn last_key(&self) -> Option<&str> {
        self.steps.last().map(|s| s.key.as_str())
    }

    /// Where an `etcd-snapshot` task writes its snapshot file.
    pub fn snapshot_path(task: &MaintenanceTask) -> Result<String, PlanError> {
        snapshot_path(task)
    }

    /// Expand a built-in task into its template.
    pub fn for_task(task: &MaintenanceTask) -> Result<Self, PlanError> {
        match task.kind {
            TaskKind::DrainNode => drain_node(task),
            TaskKind::UpgradeNode => upgrade_node(task),
            TaskKind::EtcdSnapshot => etcd_snapshot(task),
        }
    }
}

fn drain_node(task: &MaintenanceTask) -> Result<PlanTemplate, PlanError> {
    let node = task.require_str("node")?;
    let mut drain = Params::new().with("node", node);
    if let Some(timeout) = task.params.get("drain_timeout").cloned() {
        drain.insert("drain_timeout", timeout);
    }
    Ok(PlanTemplate::new("drain-node")
        .then("cordon", CORDON_NODE, Params::new().with("node", node))
        .then("drain", DRAIN_NODE, drain))
}

fn upgrade_node(task: &MaintenanceTask) -> Result<PlanTemplate, PlanError> {
    let node = task.require_str("node")?;
    let version = task.require_str("version")?;
    let version = version.strip_prefix('v').unwrap_or(version);
    let role = match task.params.get_str("role") {
        Some(raw) => raw.parse::<NodeRole>()?,
        None => NodeRole::Worker,
    };
    let with_containerd = task.list("components").iter().any(|c| c == "containerd");

    let on_node = || Params::new().with("node", node);
    let versioned = || on_node().with("version", version);

    let mut template = PlanTemplate::new(format!("upgrade-{}", role.as_str())).step(
        "download-packages",
        DOWNLOAD_PACKAGES,
        Params::new().with("version", version),
        Vec::<String>::new(),
    );

    template = match role {
        // Downloading and draining are independent.
        NodeRole::Worker => template
            .step("drain", DRAIN_NODE, on_node(), Vec::<String>::new())
            .step(
                "upgrade-kubeadm",
                UPGRADE_KUBEADM,
                versioned(),
                ["download-packages", "drain"],
            )
            .then("kubeadm-upgrade", KUBEADM_UPGRADE_NODE, on_node()),
        NodeRole::ControlPlane => template
            .then("upgrade-kubeadm", UPGRADE_KUBEADM, versioned())
            .then("kubeadm-upgrade", KUBEADM_UPGRADE_APPLY, versioned()),
    };

    template = template.then("upgrade-kubelet", UPGRADE_KUBELET, versioned());
    if with_containerd {
        template = template
            .then("upgrade-containerd", UPGRADE_CONTAINERD, on_node())
            .then("restart-containerd", RESTART_CONTAINERD, on_node());
    }
    template = template
        .then("reload-systemd", RELOAD_SYSTEMD, on_node())
        .then("restart-kubelet", RESTART_KUBELET, on_node())
        .then("verify-node", VERIFY_NODE_READY, on_node());
    if role == NodeRole::Worker {
        template = template.then("uncordon", UNCORDON_NODE, on_node());
    }
    Ok(template)
}

fn snapshot_path(task: &MaintenanceTask) -> Result<String, PlanError> {
    let name = task.require_str("snapshot_name")?;
    if name.contains('/') {
        return Err(PlanError::InvalidTask(format!(
            "snapshot name `{name}` must not contain `/`"
        )));
    }
    let dir = task
        .params
        .get_str("snapshot_dir")
        .unwrap_or(DEFAULT_SNAPSHOT_DIR)
        .trim_end_matches('/');
    Ok(format!("{dir}/{name}.db"))
}

fn etcd_snapshot(task: &MaintenanceTask) -> Result<PlanTemplate, PlanError> {
    let member = task.require_str("member")?;
    let path = snapshot_path(task)?;
    let params = Params::new()
        .with("member", member)
        .with("snapshot_path", Value::String(path.clone()));
    let mut template = PlanTemplate::new("etcd-snapshot")
        .then("save", ETCD_SNAPSHOT_SAVE, params.clone())
        .then("verify", ETCD_SNAPSHOT_VERIFY, params);
    if task.params.get("upload").and_then(Value::as_bool).unwrap_or(false) {
        let upload = Params::new()
            .with("snapshot_path", path)
            .with("snapshot_name", task.require_str("snapshot_name")?);
        template = template.then("upload", UPLOAD_SNAPSHOT, upload);
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keys(template: &PlanTemplate) -> Vec<&str> {
        template.steps.iter().map(|s| s.key.as_str()).collect()
    }

    fn upgrade(role: &str) -> MaintenanceTask {
        MaintenanceTask::new("op-1", TaskKind::UpgradeNode)
            .with("node", "n1")
            .with("version", "v1.29.3")
            .with("role", role)
    }

    #[test]
    fn drain_template_is_cordon_then_drain() {
        let task = MaintenanceTask::new("op-1", TaskKind::DrainNode).with("node", "n1");
        let template = PlanTemplate::for_task(&task).unwrap();
        assert_eq!(keys(&template), vec!["cordon", "drain"]);
        assert_eq!(template.steps[1].depends_on, vec!["cordon"]);
        assert_eq!(template.steps[1].operation, DRAIN_NODE);
    }

    #[test]
    fn worker_upgrade_drains_and_uncordons() {
        let template = PlanTemplate::for_task(&upgrade("worker")).unwrap();
        assert_eq!(template.name, "upgrade-worker");
        assert_eq!(
            keys(&template),
            vec![
                "download-packages",
                "drain",
                "upgrade-kubeadm",
                "kubeadm-upgrade",
                "upgrade-kubelet",
                "reload-systemd",
                "restart-kubelet",
                "verify-node",
                "uncordon",
            ]
        );
        assert!(template.steps[1].depends_on.is_empty());
        assert_eq!(template.steps[2].depends_on, vec!["download-packages", "drain"]);
        assert_eq!(template.steps[3].operation, KUBEADM_UPGRADE_NODE);
    }

    #[test]
    fn control_plane_upgrade_applies_without_drain() {
        let template = PlanTemplate::for_task(&upgrade("control-plane")).unwrap();
        assert_eq!(template.name, "upgrade-control-plane");
        assert!(!keys(&template).contains(&"drain"));
        assert!(!keys(&template).contains(&"uncordon"));
        let apply = &template.steps[2];
        assert_eq!(apply.operation, KUBEADM_UPGRADE_APPLY);
        assert_eq!(apply.params.get_str("version"), Some("1.29.3"));
    }

    #[test]
    fn containerd_component_adds_steps() {
        let task = upgrade("worker").with("components", json!(["containerd"]));
        let template = PlanTemplate::for_task(&task).unwrap();
        let keys = keys(&template);
        let kubelet = keys.iter().position(|k| *k == "upgrade-kubelet").unwrap();
        assert_eq!(keys[kubelet + 1], "upgrade-containerd");
        assert_eq!(keys[kubelet + 2], "restart-containerd");
    }

    #[test]
    fn upgrade_requires_version() {
        let task = MaintenanceTask::new("op-1", TaskKind::UpgradeNode).with("node", "n1");
        assert!(matches!(
            PlanTemplate::for_task(&task),
            Err(PlanError::InvalidTask(_))
        ));
    }

    #[test]
    fn etcd_snapshot_path_from_dir_and_name() {
        let task = MaintenanceTask::new("op-2", TaskKind::EtcdSnapshot)
            .with("member", "cp-1")
            .with("snapshot_name", "nightly")
            .with("snapshot_dir", "/backups/");
        let template = PlanTemplate::for_task(&task).unwrap();
        assert_eq!(keys(&template), vec!["save", "verify"]);
        assert_eq!(
            template.steps[0].params.get_str("snapshot_path"),
            Some("/backups/nightly.db")
        );
    }

    #[test]
    fn etcd_snapshot_uploads_after_verify_when_asked() {
        let task = MaintenanceTask::new("op-3", TaskKind::EtcdSnapshot)
            .with("member", "cp-1")
            .with("snapshot_name", "nightly")
            .with("upload", true);
        let template = PlanTemplate::for_task(&task).unwrap();
        assert_eq!(keys(&template), vec!["save", "verify", "upload"]);
        let upload = &template.steps[2];
        assert_eq!(upload.operation, UPLOAD_SNAPSHOT);
        assert_eq!(upload.depends_on, vec!["verify"]);
        assert_eq!(upload.params.get_str("snapshot_name"), Some("nightly"));
        assert_eq!(
            upload.params.get_str("snapshot_path"),
            Some("/var/lib/steward/snapshots/nightly.db")
        );
        assert_eq!(snapshot_path(&task).unwrap(), "/var/lib/steward/snapshots/nightly.db");
    }

    #[test]
    fn etcd_snapshot_name_cannot_escape_dir() {
        let task = MaintenanceTask::new("op-2", TaskKind::EtcdSnapshot)
            .with("member", "cp-1")
            .with("snapshot_name", "../etc/passwd");
        assert!(PlanTemplate::for_task(&task).is_err());
    }

    #[test]
    fn then_on_empty_template_has_no_dependencies() {
        let template = PlanTemplate::new("t").then("a", "op", Params::new());
        assert!(template.steps[0].depends_on.is_empty());
        assert_eq!(template.last_key(), Some("a"));
    }
}
