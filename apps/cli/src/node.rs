//! The agent's view of the cluster: its own Node object (labels and
//! `steward.io/*` annotations) and the backup request ConfigMaps, read and
//! written through `kubectl`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use steward_core::constants::{
    ANNOTATION_COMPONENTS, ANNOTATION_OPERATION_ID, ANNOTATION_STATUS, ANNOTATION_TARGET_VERSION,
};
use steward_execution::PlanStatus;
use steward_plan::{MaintenanceTask, NodeRole, PlanTemplate, TaskKind};
use tokio::process::Command;

/// Labels and annotations of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// `metadata.labels`
    pub labels: BTreeMap<String, String>,
    /// `metadata.annotations`
    pub annotations: BTreeMap<String, String>,
}

/// Value of the `steward.io/status` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Requested, not picked up yet.
    Pending,
    /// A plan is executing.
    Running,
    /// The plan succeeded.
    Completed,
    /// The plan failed and rolled back.
    Failed,
    /// The plan stopped in a state an operator has to inspect.
    NeedsReview,
}

impl RequestStatus {
    /// Annotation value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NeedsReview => "needs-review",
        }
    }

    /// Parse an annotation value; unknown values are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "needs-review" => Some(Self::NeedsReview),
            _ => None,
        }
    }

    /// Status to report for a plan that stopped in `status`; `None` while it
    /// is still in progress.
    pub fn for_plan(status: PlanStatus) -> Option<Self> {
        match status {
            PlanStatus::Succeeded => Some(Self::Completed),
            PlanStatus::Failed | PlanStatus::RolledBack => Some(Self::Failed),
            PlanStatus::NeedsOperatorReview => Some(Self::NeedsReview),
            PlanStatus::Building | PlanStatus::Executing => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeInfo {
    /// Requested operation id, if any.
    pub fn operation_id(&self) -> Option<&str> {
        self.annotations
            .get(ANNOTATION_OPERATION_ID)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }

    /// Current request status. A request without a status is pending.
    pub fn request_status(&self) -> Option<RequestStatus> {
        RequestStatus::parse(
            self.annotations
                .get(ANNOTATION_STATUS)
                .map_or("", String::as_str),
        )
    }

    /// The upgrade task requested on this node, if one is pending.
    pub fn pending_upgrade(&self) -> anyhow::Result<Option<MaintenanceTask>> {
        let Some(operation_id) = self.operation_id() else {
            return Ok(None);
        };
        if self.request_status() != Some(RequestStatus::Pending) {
            return Ok(None);
        }
        let Some(version) = self.annotations.get(ANNOTATION_TARGET_VERSION) else {
            bail!("operation {operation_id} has no {ANNOTATION_TARGET_VERSION} annotation");
        };
        let role = NodeRole::from_labels(&self.labels);
        let mut task = MaintenanceTask::new(operation_id, TaskKind::UpgradeNode)
            .with("node", self.name.clone())
            .with("version", version.trim())
            .with("role", role.as_str());
        if let Some(components) = self.annotations.get(ANNOTATION_COMPONENTS) {
            task = task.with("components", components.clone());
        }
        Ok(Some(task))
    }
}

/// Name and data of one ConfigMap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMapInfo {
    /// `metadata.name`
    pub name: String,
    /// `data`
    pub data: BTreeMap<String, String>,
}

/// An etcd backup requested through a ConfigMap labelled
/// `steward.io/backup=true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    /// Request ConfigMap, deleted once the outcome is recorded.
    pub config_map: String,
    /// Node expected to take the snapshot.
    pub node: String,
    /// Caller-supplied operation id.
    pub operation_id: String,
    /// Snapshot file name, without extension.
    pub snapshot_name: String,
}

impl BackupRequest {
    /// Read a request ConfigMap.
    pub fn parse(config_map: &ConfigMapInfo) -> anyhow::Result<Self> {
        let field = |key: &str| {
            config_map
                .data
                .get(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .with_context(|| format!("backup request {} has no `{key}`", config_map.name))
        };
        Ok(Self {
            config_map: config_map.name.clone(),
            node: field("node_name")?,
            operation_id: field("operation_id")?,
            snapshot_name: field("snapshot_name")?,
        })
    }

    /// The snapshot task; `upload` adds the object-store copy.
    pub fn task(&self, snapshot_dir: &str, upload: bool) -> MaintenanceTask {
        MaintenanceTask::new(self.operation_id.clone(), TaskKind::EtcdSnapshot)
            .with("member", self.node.clone())
            .with("snapshot_name", self.snapshot_name.clone())
            .with("snapshot_dir", snapshot_dir)
            .with("upload", upload)
    }

    /// Name of the ConfigMap the outcome is written to.
    pub fn status_name(&self) -> String {
        format!("backup-status-{}-{}", self.operation_id, self.node).replace('.', "-")
    }

    /// Data of the status ConfigMap.
    pub fn status_data(
        &self,
        success: bool,
        message: &str,
        at: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("completed".to_owned(), "true".to_owned()),
            ("success".to_owned(), success.to_string()),
            ("message".to_owned(), message.to_owned()),
            ("snapshot_name".to_owned(), self.snapshot_name.clone()),
            ("timestamp".to_owned(), at.to_rfc3339()),
        ])
    }
}

/// Where a backup task leaves its snapshot, for the success message.
pub fn snapshot_location(task: &MaintenanceTask) -> String {
    PlanTemplate::snapshot_path(task).unwrap_or_default()
}

/// Read and annotate the node this agent manages.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Fetch the node's labels and annotations.
    async fn get(&self, node: &str) -> anyhow::Result<NodeInfo>;

    /// Set one annotation, replacing any previous value.
    async fn annotate(&self, node: &str, key: &str, value: &str) -> anyhow::Result<()>;
}

/// List, write and delete ConfigMaps in one namespace.
#[async_trait]
pub trait ConfigMapApi: Send + Sync {
    /// ConfigMaps matching a label selector.
    async fn list_config_maps(
        &self,
        namespace: &str,
        selector: &str,
    ) -> anyhow::Result<Vec<ConfigMapInfo>>;

    /// Create `name` with `data`, replacing an existing ConfigMap.
    async fn put_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> anyhow::Result<()>;

    /// Delete `name`; a missing ConfigMap is not an error.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> anyhow::Result<()>;
}

/// [`NodeApi`] and [`ConfigMapApi`] backed by the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct NodeObject {
    metadata: NodeMetadata,
}

#[derive(Deserialize)]
struct NodeMetadata {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ConfigMapList {
    #[serde(default)]
    items: Vec<ConfigMapObject>,
}

#[derive(Deserialize)]
struct ConfigMapObject {
    metadata: ConfigMapMetadata,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ConfigMapMetadata {
    name: String,
}

impl Kubectl {
    /// `binary` is the kubectl path; every call is bounded by `timeout`.
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<Vec<u8>> {
        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .with_context(|| format!("{} {} timed out", self.binary, args.join(" ")))?
            .with_context(|| format!("failed to spawn {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }
}

/// Parse the output of `kubectl get node <name> -o json`.
pub fn parse_node(json: &[u8]) -> anyhow::Result<NodeInfo> {
    let object: NodeObject = serde_json::from_slice(json).context("unexpected node object")?;
    Ok(NodeInfo {
        name: object.metadata.name,
        labels: object.metadata.labels,
        annotations: object.metadata.annotations,
    })
}

/// Parse the output of `kubectl get configmaps -o json`.
pub fn parse_config_maps(json: &[u8]) -> anyhow::Result<Vec<ConfigMapInfo>> {
    let list: ConfigMapList = serde_json::from_slice(json).context("unexpected ConfigMap list")?;
    Ok(list
        .items
        .into_iter()
        .map(|item| ConfigMapInfo {
            name: item.metadata.name,
            data: item.data,
        })
        .collect())
}

#[async_trait]
impl NodeApi for Kubectl {
    async fn get(&self, node: &str) -> anyhow::Result<NodeInfo> {
        let stdout = self.run(&["get", "node", node, "-o", "json"]).await?;
        parse_node(&stdout)
    }

    async fn annotate(&self, node: &str, key: &str, value: &str) -> anyhow::Result<()> {
        let assignment = format!("{key}={value}");
        self.run(&["annotate", "node", node, &assignment, "--overwrite"])
            .await
            .map(drop)
    }
}

#[async_trait]
impl ConfigMapApi for Kubectl {
    async fn list_config_maps(
        &self,
        namespace: &str,
        selector: &str,
    ) -> anyhow::Result<Vec<ConfigMapInfo>> {
        let stdout = self
            .run(&["get", "configmaps", "-n", namespace, "-l", selector, "-o", "json"])
            .await?;
        parse_config_maps(&stdout)
    }

    async fn put_config_map(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        self.delete_config_map(namespace, name).await?;
        let literals: Vec<String> = data
            .iter()
            .map(|(key, value)| format!("--from-literal={key}={value}"))
            .collect();
        let mut args = vec!["create", "configmap", name, "-n", namespace];
        args.extend(literals.iter().map(String::as_str));
        self.run(&args).await.map(drop)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.run(&["delete", "configmap", name, "-n", namespace, "--ignore-not-found"])
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use steward_core::constants::LABEL_CONTROL_PLANE;

    fn node(annotations: &[(&str, &str)]) -> NodeInfo {
        NodeInfo {
            name: "w1".into(),
            labels: BTreeMap::new(),
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn parses_kubectl_output() {
        let json = br#"{
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {
                "name": "cp-1",
                "labels": {"node-role.kubernetes.io/control-plane": ""},
                "annotations": {"steward.io/operation-id": "op-7"}
            },
            "status": {}
        }"#;
        let info = parse_node(json).unwrap();
        assert_eq!(info.name, "cp-1");
        assert!(info.labels.contains_key(LABEL_CONTROL_PLANE));
        assert_eq!(info.operation_id(), Some("op-7"));
    }

    #[test]
    fn node_without_annotations_parses() {
        let info = parse_node(br#"{"metadata": {"name": "w1"}}"#).unwrap();
        assert!(info.annotations.is_empty());
        assert_eq!(info.pending_upgrade().unwrap(), None);
    }

    #[test]
    fn pending_request_becomes_upgrade_task() {
        let mut info = node(&[
            (ANNOTATION_OPERATION_ID, "op-1"),
            (ANNOTATION_STATUS, "pending"),
            (ANNOTATION_TARGET_VERSION, "v1.29.3"),
            (ANNOTATION_COMPONENTS, "containerd"),
        ]);
        info.labels.insert(LABEL_CONTROL_PLANE.into(), String::new());

        let task = info.pending_upgrade().unwrap().unwrap();
        assert_eq!(task.request_id, "op-1");
        assert_eq!(task.kind, TaskKind::UpgradeNode);
        assert_eq!(task.params.get_str("node"), Some("w1"));
        assert_eq!(task.params.get_str("role"), Some("control-plane"));
        assert_eq!(task.list("components"), vec!["containerd"]);
    }

    #[rstest]
    #[case("running")]
    #[case("completed")]
    #[case("failed")]
    #[case("needs-review")]
    #[case("bogus")]
    fn only_pending_requests_are_picked_up(#[case] status: &str) {
        let info = node(&[
            (ANNOTATION_OPERATION_ID, "op-1"),
            (ANNOTATION_STATUS, status),
            (ANNOTATION_TARGET_VERSION, "1.29.3"),
        ]);
        assert_eq!(info.pending_upgrade().unwrap(), None);
    }

    #[test]
    fn missing_status_counts_as_pending() {
        let info = node(&[
            (ANNOTATION_OPERATION_ID, "op-1"),
            (ANNOTATION_TARGET_VERSION, "1.29.3"),
        ]);
        assert!(info.pending_upgrade().unwrap().is_some());
    }

    #[test]
    fn pending_request_without_version_is_rejected() {
        let info = node(&[(ANNOTATION_OPERATION_ID, "op-1")]);
        assert!(info.pending_upgrade().is_err());
    }

    fn request_map(data: &[(&str, &str)]) -> ConfigMapInfo {
        ConfigMapInfo {
            name: "backup-req-1".into(),
            data: data
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn parses_config_map_list() {
        let json = br#"{
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {"metadata": {"name": "req-a"}, "data": {"node_name": "cp-1"}},
                {"metadata": {"name": "req-b"}}
            ]
        }"#;
        let maps = parse_config_maps(json).unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].data.get("node_name").map(String::as_str), Some("cp-1"));
        assert!(maps[1].data.is_empty());
    }

    #[test]
    fn backup_request_becomes_snapshot_task() {
        let request = BackupRequest::parse(&request_map(&[
            ("node_name", "cp-1.example"),
            ("operation_id", "op.9"),
            ("snapshot_name", "nightly"),
        ]))
        .unwrap();
        assert_eq!(request.status_name(), "backup-status-op-9-cp-1-example");

        let task = request.task("/backups", true);
        assert_eq!(task.kind, TaskKind::EtcdSnapshot);
        assert_eq!(task.request_id, "op.9");
        assert_eq!(task.params.get_str("member"), Some("cp-1.example"));
        assert_eq!(snapshot_location(&task), "/backups/nightly.db");
        let keys: Vec<String> = PlanTemplate::for_task(&task)
            .unwrap()
            .steps
            .into_iter()
            .map(|step| step.key)
            .collect();
        assert_eq!(keys, vec!["save", "verify", "upload"]);
    }

    #[test]
    fn backup_request_needs_every_field() {
        let map = request_map(&[("node_name", "cp-1"), ("operation_id", "op-1")]);
        let err = BackupRequest::parse(&map).unwrap_err();
        assert!(err.to_string().contains("snapshot_name"));
    }

    #[test]
    fn status_data_records_outcome() {
        let request = BackupRequest::parse(&request_map(&[
            ("node_name", "cp-1"),
            ("operation_id", "op-1"),
            ("snapshot_name", "nightly"),
        ]))
        .unwrap();
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let data = request.status_data(false, "save: exit 1", at);
        assert_eq!(data["completed"], "true");
        assert_eq!(data["success"], "false");
        assert_eq!(data["message"], "save: exit 1");
        assert_eq!(data["snapshot_name"], "nightly");
        assert_eq!(data["timestamp"], "2026-01-02T03:04:05+00:00");
    }

    #[rstest]
    #[case(PlanStatus::Succeeded, Some(RequestStatus::Completed))]
    #[case(PlanStatus::RolledBack, Some(RequestStatus::Failed))]
    #[case(PlanStatus::Failed, Some(RequestStatus::Failed))]
    #[case(PlanStatus::NeedsOperatorReview, Some(RequestStatus::NeedsReview))]
    #[case(PlanStatus::Executing, None)]
    fn plan_status_maps_to_annotation(
        #[case] plan: PlanStatus,
        #[case] expected: Option<RequestStatus>,
    ) {
        assert_eq!(RequestStatus::for_plan(plan), expected);
    }
}
