//! The standard operation catalog used by the built-in task templates.
//!
//! Every command here maps to one step of the node upgrade, drain and etcd
//! backup flows. Host package commands are rendered for the configured
//! package manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use steward_core::{ParamKind, TargetKind};

use crate::command::CommandTemplate;
use crate::error::PlanError;
use crate::operation::{LockScope, Operation};
use crate::probe::Probe;
use crate::registry::{OperationRegistry, OperationRegistryBuilder};

/// Names of the catalog operations.
pub mod names {
    /// `kubectl cordon`
    pub const CORDON_NODE: &str = "cordon-node";
    /// `kubectl uncordon`
    pub const UNCORDON_NODE: &str = "uncordon-node";
    /// `kubectl drain`
    pub const DRAIN_NODE: &str = "drain-node";
    /// Wait for the node `Ready` condition.
    pub const VERIFY_NODE_READY: &str = "verify-node-ready";
    /// `kubectl delete node`
    pub const REMOVE_NODE: &str = "remove-node";
    /// `kubectl annotate node`
    pub const ANNOTATE_NODE: &str = "annotate-node";
    /// Pre-fetch the target version's packages.
    pub const DOWNLOAD_PACKAGES: &str = "download-packages";
    /// Install the target `kubeadm` package.
    pub const UPGRADE_KUBEADM: &str = "upgrade-kubeadm";
    /// `kubeadm upgrade apply` (first control-plane node).
    pub const KUBEADM_UPGRADE_APPLY: &str = "kubeadm-upgrade-apply";
    /// `kubeadm upgrade node` (every other node).
    pub const KUBEADM_UPGRADE_NODE: &str = "kubeadm-upgrade-node";
    /// Install the target `kubelet` and `kubectl` packages.
    pub const UPGRADE_KUBELET: &str = "upgrade-kubelet";
    /// Install the latest `containerd.io` package.
    pub const UPGRADE_CONTAINERD: &str = "upgrade-containerd";
    /// `systemctl restart containerd`
    pub const RESTART_CONTAINERD: &str = "restart-containerd";
    /// `systemctl daemon-reload`
    pub const RELOAD_SYSTEMD: &str = "reload-systemd";
    /// `systemctl restart kubelet`
    pub const RESTART_KUBELET: &str = "restart-kubelet";
    /// `etcdctl snapshot save`
    pub const ETCD_SNAPSHOT_SAVE: &str = "etcd-snapshot-save";
    /// `etcdctl snapshot status`
    pub const ETCD_SNAPSHOT_VERIFY: &str = "etcd-snapshot-verify";
    /// `umount`
    pub const UNMOUNT_VOLUME: &str = "unmount-volume";
    /// `mount`
    pub const MOUNT_VOLUME: &str = "mount-volume";
    /// Copy a verified snapshot to the configured object store. Only
    /// registered when a store is configured.
    pub const UPLOAD_SNAPSHOT: &str = "upload-snapshot";
}

use names::*;

/// Host package manager the package commands are rendered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Decided by [`PackageManager::resolve`]; rendered as `apt-get` if
    /// never resolved.
    #[default]
    Auto,
    /// Debian / Ubuntu `apt-get`.
    Apt,
    /// RHEL / CentOS `yum`.
    Yum,
}

impl PackageManager {
    /// Pick a concrete manager for `Auto`: `yum` when only `yum` is
    /// installed, `apt-get` otherwise.
    #[must_use]
    pub fn resolve(self, installed: impl Fn(&str) -> bool) -> Self {
        match self {
            Self::Auto if !installed("apt-get") && installed("yum") => Self::Yum,
            Self::Auto => Self::Apt,
            other => other,
        }
    }
}

/// Paths of the external binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binaries {
    /// `kubectl`
    pub kubectl: String,
    /// `kubeadm`
    pub kubeadm: String,
    /// `kubelet`
    pub kubelet: String,
    /// `etcdctl`
    pub etcdctl: String,
    /// `systemctl`
    pub systemctl: String,
    /// `mount`
    pub mount: String,
    /// `umount`
    pub umount: String,
    /// `findmnt`
    pub findmnt: String,
    /// `apt-get`
    pub apt_get: String,
    /// `yum`
    pub yum: String,
    /// `aws`
    pub aws: String,
    /// `gcloud`
    pub gcloud: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".into(),
            kubeadm: "kubeadm".into(),
            kubelet: "kubelet".into(),
            etcdctl: "etcdctl".into(),
            systemctl: "systemctl".into(),
            mount: "mount".into(),
            umount: "umount".into(),
            findmnt: "findmnt".into(),
            apt_get: "apt-get".into(),
            yum: "yum".into(),
            aws: "aws".into(),
            gcloud: "gcloud".into(),
        }
    }
}

/// etcd client connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConnection {
    /// Client endpoints.
    pub endpoints: Vec<String>,
    /// CA certificate.
    pub cacert: String,
    /// Client certificate.
    pub cert: String,
    /// Client key.
    pub key: String,
}

impl Default for EtcdConnection {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://127.0.0.1:2379".into()],
            cacert: "/etc/kubernetes/pki/etcd/ca.crt".into(),
            cert: "/etc/kubernetes/pki/etcd/server.crt".into(),
            key: "/etc/kubernetes/pki/etcd/server.key".into(),
        }
    }
}

/// Object store flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// S3 or an S3-compatible endpoint, through the `aws` CLI.
    S3,
    /// Google Cloud Storage, through `gcloud storage`.
    Gcs,
}

/// Object store that verified etcd snapshots are copied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStore {
    /// Store flavour.
    #[serde(rename = "type")]
    pub kind: StoreKind,
    /// Bucket name.
    pub bucket: String,
    /// Custom S3 endpoint, e.g. a MinIO deployment.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket.
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
}

fn default_store_prefix() -> String {
    "etcd-snapshots".into()
}

impl BackupStore {
    /// Object URL a snapshot named `{snapshot_name}` lands at, with the
    /// placeholder left for rendering.
    #[must_use]
    pub fn object_url(&self) -> String {
        let scheme = match self.kind {
            StoreKind::S3 => "s3",
            StoreKind::Gcs => "gs",
        };
        let prefix = self.prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            self.bucket.clone()
        } else {
            format!("{}/{prefix}", self.bucket)
        };
        format!("{scheme}://{}/{{snapshot_name}}.db", literal(&base))
    }
}

/// Everything the catalog needs to render concrete commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Package manager for host package operations.
    pub package_manager: PackageManager,
    /// Binary locations.
    pub binaries: Binaries,
    /// etcd client settings.
    pub etcd: EtcdConnection,
    /// Upload target for etcd snapshots; no upload operation without it.
    pub backup_store: Option<BackupStore>,
}

/// Build a registry holding the standard catalog.
pub fn standard_registry(config: &CatalogConfig) -> Result<OperationRegistry, PlanError> {
    let mut builder = OperationRegistryBuilder::new();
    register_standard(&mut builder, config)?;
    builder.build()
}

/// Register the standard catalog into an existing builder, so callers can
/// add their own operations alongside.
pub fn register_standard(
    builder: &mut OperationRegistryBuilder,
    config: &CatalogConfig,
) -> Result<(), PlanError> {
    for operation in cluster_operations(&config.binaries)
        .into_iter()
        .chain(package_operations(config))
        .chain(service_operations(&config.binaries))
        .chain(etcd_operations(&config.binaries, &config.etcd))
        .chain(volume_operations(&config.binaries))
        .chain(upload_operations(config))
    {
        builder.register(operation)?;
    }
    Ok(())
}

/// Escape literal text so it survives template parsing.
fn literal(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn kubectl(bin: &Binaries) -> CommandTemplate {
    CommandTemplate::new(literal(&bin.kubectl))
}

fn cluster_operations(bin: &Binaries) -> Vec<Operation> {
    vec![
        Operation::new(CORDON_NODE, TargetKind::ClusterApi, kubectl(bin).args(["cordon", "{node}"]))
            .idempotent()
            .compensated_by(UNCORDON_NODE)
            .param("node", ParamKind::String)
            .lock(LockScope::Node, "node"),
        Operation::new(UNCORDON_NODE, TargetKind::ClusterApi, kubectl(bin).args(["uncordon", "{node}"]))
            .idempotent()
            .param("node", ParamKind::String)
            .lock(LockScope::Node, "node"),
        Operation::new(
            DRAIN_NODE,
            TargetKind::ClusterApi,
            kubectl(bin).args([
                "drain",
                "{node}",
                "--ignore-daemonsets",
                "--delete-emptydir-data",
                "--timeout={drain_timeout?}",
            ]),
        )
        .idempotent()
        .compensated_by(UNCORDON_NODE)
        .param("node", ParamKind::String)
        .optional_param("drain_timeout", ParamKind::String)
        .timeout(Duration::from_secs(330))
        .lock(LockScope::Node, "node"),
        // Polling is the engine's job: each attempt waits briefly and a
        // timeout is retryable.
        Operation::new(
            VERIFY_NODE_READY,
            TargetKind::ClusterApi,
            kubectl(bin).args(["wait", "--for=condition=Ready", "node/{node}", "--timeout=20s"]),
        )
        .idempotent()
        .param("node", ParamKind::String)
        .max_attempts(15),
        Operation::new(REMOVE_NODE, TargetKind::ClusterApi, kubectl(bin).args(["delete", "node", "{node}"]))
            .param("node", ParamKind::String)
            .reconcile_with(Probe::exit_non_zero(
                kubectl(bin).args(["get", "node", "{node}"]),
            ))
            .lock(LockScope::Node, "node"),
        Operation::new(
            ANNOTATE_NODE,
            TargetKind::ClusterApi,
            kubectl(bin).args(["annotate", "node", "{node}", "--overwrite", "{key}={value}"]),
        )
        .idempotent()
        .param("node", ParamKind::String)
        .param("key", ParamKind::String)
        .param("value", ParamKind::String)
        .lock(LockScope::Node, "node"),
    ]
}

fn package_operations(config: &CatalogConfig) -> Vec<Operation> {
    let bin = &config.binaries;
    let manager = config.package_manager.resolve(|_| false);
    let install = |packages: &[&str]| match manager {
        PackageManager::Apt | PackageManager::Auto => CommandTemplate::new(literal(&bin.apt_get))
            .args(["install", "-y", "--allow-change-held-packages"])
            .args(packages.iter().map(|p| format!("{p}={{version}}-00")))
            .env("DEBIAN_FRONTEND", "noninteractive"),
        PackageManager::Yum => CommandTemplate::new(literal(&bin.yum))
            .args(["install", "-y"])
            .args(packages.iter().map(|p| format!("{p}-{{version}}-0"))),
    };
    let download = match manager {
        PackageManager::Apt | PackageManager::Auto => CommandTemplate::new(literal(&bin.apt_get))
            .arg("download")
            .args(["kubeadm", "kubelet", "kubectl"].map(|p| format!("{p}={{version}}-00"))),
        PackageManager::Yum => CommandTemplate::new(literal(&bin.yum))
            .args(["install", "--downloadonly", "-y"])
            .args(["kubeadm", "kubelet", "kubectl"].map(|p| format!("{p}-{{version}}-0"))),
    };
    let containerd = match manager {
        PackageManager::Apt | PackageManager::Auto => CommandTemplate::new(literal(&bin.apt_get))
            .args(["install", "-y", "--allow-change-held-packages", "containerd.io"])
            .env("DEBIAN_FRONTEND", "noninteractive"),
        PackageManager::Yum => {
            CommandTemplate::new(literal(&bin.yum)).args(["update", "-y", "containerd.io"])
        }
    };
    let version_probe = |binary: &str, args: &[&str]| {
        Probe::stdout_contains(
            CommandTemplate::new(literal(binary)).args(args.iter().copied()),
            "v{version}",
        )
    };

    vec![
        Operation::new(DOWNLOAD_PACKAGES, TargetKind::Host, download)
            .idempotent()
            .param("version", ParamKind::String)
            .max_attempts(3),
        Operation::new(UPGRADE_KUBEADM, TargetKind::Host, install(&["kubeadm"]))
            .idempotent()
            .param("version", ParamKind::String)
            .param("node", ParamKind::String)
            .reconcile_with(version_probe(&bin.kubeadm, &["version", "-o", "short"]))
            .lock(LockScope::Node, "node"),
        Operation::new(
            KUBEADM_UPGRADE_APPLY,
            TargetKind::Host,
            CommandTemplate::new(literal(&bin.kubeadm))
                .args(["upgrade", "apply", "v{version}", "-y", "--force"]),
        )
        .param("version", ParamKind::String)
        .param("node", ParamKind::String)
        .precondition(Probe::exit_zero(
            CommandTemplate::new(literal(&bin.kubeadm)).args(["upgrade", "plan", "v{version}"]),
        ))
        .reconcile_with(Probe::stdout_contains(
            kubectl(bin).args([
                "-n",
                "kube-system",
                "get",
                "pod",
                "-l",
                "component=kube-apiserver",
                "-o",
                "jsonpath={{..image}}",
            ]),
            "v{version}",
        ))
        .max_attempts(1)
        .timeout(Duration::from_secs(900))
        .lock(LockScope::Node, "node"),
        Operation::new(
            KUBEADM_UPGRADE_NODE,
            TargetKind::Host,
            CommandTemplate::new(literal(&bin.kubeadm)).args(["upgrade", "node"]),
        )
        .idempotent()
        .param("node", ParamKind::String)
        .timeout(Duration::from_secs(600))
        .lock(LockScope::Node, "node"),
        Operation::new(UPGRADE_KUBELET, TargetKind::Host, install(&["kubelet", "kubectl"]))
            .idempotent()
            .param("version", ParamKind::String)
            .param("node", ParamKind::String)
            .reconcile_with(version_probe(&bin.kubelet, &["--version"]))
            .lock(LockScope::Node, "node"),
        Operation::new(UPGRADE_CONTAINERD, TargetKind::Host, containerd)
            .idempotent()
            .param("node", ParamKind::String)
            .lock(LockScope::Node, "node"),
    ]
}

fn service_operations(bin: &Binaries) -> Vec<Operation> {
    let systemctl = || CommandTemplate::new(literal(&bin.systemctl));
    let restart = |name: &str, unit: &str| {
        Operation::new(name, TargetKind::Host, systemctl().args(["restart", unit]))
            .idempotent()
            .param("node", ParamKind::String)
            .reconcile_with(Probe::exit_zero(systemctl().args(["is-active", unit])))
            .max_attempts(3)
            .lock(LockScope::Node, "node")
    };
    vec![
        Operation::new(RELOAD_SYSTEMD, TargetKind::Host, systemctl().arg("daemon-reload"))
            .idempotent()
            .param("node", ParamKind::String)
            .lock(LockScope::Node, "node"),
        restart(RESTART_KUBELET, "kubelet"),
        restart(RESTART_CONTAINERD, "containerd"),
    ]
}

fn etcd_operations(bin: &Binaries, etcd: &EtcdConnection) -> Vec<Operation> {
    let etcdctl = || CommandTemplate::new(literal(&bin.etcdctl)).env("ETCDCTL_API", "3");
    let connection = [
        format!("--endpoints={}", literal(&etcd.endpoints.join(","))),
        format!("--cacert={}", literal(&etcd.cacert)),
        format!("--cert={}", literal(&etcd.cert)),
        format!("--key={}", literal(&etcd.key)),
    ];
    let status = || etcdctl().args(["snapshot", "status", "{snapshot_path}", "--write-out=table"]);

    vec![
        // A rerun overwrites the file; the status check tells a complete
        // snapshot from a torn one.
        Operation::new(
            ETCD_SNAPSHOT_SAVE,
            TargetKind::Etcd,
            etcdctl()
                .args(["snapshot", "save", "{snapshot_path}"])
                .args(connection),
        )
        .param("snapshot_path", ParamKind::String)
        .param("member", ParamKind::String)
        .reconcile_with(Probe::exit_zero(status()))
        .max_attempts(3)
        .lock(LockScope::EtcdMember, "member"),
        Operation::new(ETCD_SNAPSHOT_VERIFY, TargetKind::Etcd, status())
            .idempotent()
            .param("snapshot_path", ParamKind::String)
            .param("member", ParamKind::String)
            .lock(LockScope::EtcdMember, "member"),
    ]
}

fn volume_operations(bin: &Binaries) -> Vec<Operation> {
    let is_mounted =
        || CommandTemplate::new(literal(&bin.findmnt)).args(["--mountpoint", "{path}"]);
    vec![
        Operation::new(
            UNMOUNT_VOLUME,
            TargetKind::Host,
            CommandTemplate::new(literal(&bin.umount)).arg("{path}"),
        )
        .idempotent()
        .compensated_by(MOUNT_VOLUME)
        .param("path", ParamKind::String)
        .param("device", ParamKind::String)
        .optional_param("options", ParamKind::String)
        .reconcile_with(Probe::exit_non_zero(is_mounted()))
        .max_attempts(3)
        .lock(LockScope::Mount, "path"),
        Operation::new(
            MOUNT_VOLUME,
            TargetKind::Host,
            CommandTemplate::new(literal(&bin.mount))
                .args(["{device}", "{path}", "--options={options?}"]),
        )
        .idempotent()
        .compensated_by(UNMOUNT_VOLUME)
        .param("path", ParamKind::String)
        .param("device", ParamKind::String)
        .optional_param("options", ParamKind::String)
        .reconcile_with(Probe::exit_zero(is_mounted()))
        .max_attempts(3)
        .lock(LockScope::Mount, "path"),
    ]
}

fn upload_operations(config: &CatalogConfig) -> Vec<Operation> {
    let Some(store) = &config.backup_store else {
        return Vec::new();
    };
    let bin = &config.binaries;
    let url = store.object_url();
    let (copy, exists) = match store.kind {
        StoreKind::S3 => {
            let endpoint: Vec<String> = store
                .endpoint
                .iter()
                .map(|endpoint| format!("--endpoint-url={}", literal(endpoint)))
                .collect();
            let aws = || CommandTemplate::new(literal(&bin.aws)).arg("s3");
            (
                aws().args(["cp", "{snapshot_path}", url.as_str()]).args(endpoint.clone()),
                aws().args(["ls", url.as_str()]).args(endpoint),
            )
        }
        StoreKind::Gcs => {
            let gcloud = || CommandTemplate::new(literal(&bin.gcloud)).arg("storage");
            (
                gcloud().args(["cp", "{snapshot_path}", url.as_str()]),
                gcloud().args(["ls", url.as_str()]),
            )
        }
    };
    vec![
        // Re-copying overwrites the same object; a listing tells whether a
        // timed-out copy landed.
        Operation::new(UPLOAD_SNAPSHOT, TargetKind::Host, copy)
            .idempotent()
            .param("snapshot_path", ParamKind::String)
            .param("snapshot_name", ParamKind::String)
            .reconcile_with(Probe::exit_zero(exists))
            .max_attempts(3)
            .timeout(Duration::from_secs(600)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use steward_core::Params;

    #[test]
    fn auto_prefers_apt() {
        assert_eq!(PackageManager::Auto.resolve(|_| true), PackageManager::Apt);
        assert_eq!(PackageManager::Auto.resolve(|bin| bin == "yum"), PackageManager::Yum);
        assert_eq!(PackageManager::Auto.resolve(|_| false), PackageManager::Apt);
        assert_eq!(PackageManager::Yum.resolve(|_| true), PackageManager::Yum);
    }

    fn registry(package_manager: PackageManager) -> OperationRegistry {
        standard_registry(&CatalogConfig {
            package_manager,
            ..CatalogConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn standard_catalog_validates() {
        let registry = registry(PackageManager::Apt);
        for name in [
            CORDON_NODE,
            UNCORDON_NODE,
            DRAIN_NODE,
            VERIFY_NODE_READY,
            REMOVE_NODE,
            ANNOTATE_NODE,
            DOWNLOAD_PACKAGES,
            UPGRADE_KUBEADM,
            KUBEADM_UPGRADE_APPLY,
            KUBEADM_UPGRADE_NODE,
            UPGRADE_KUBELET,
            UPGRADE_CONTAINERD,
            RESTART_CONTAINERD,
            RELOAD_SYSTEMD,
            RESTART_KUBELET,
            ETCD_SNAPSHOT_SAVE,
            ETCD_SNAPSHOT_VERIFY,
            UNMOUNT_VOLUME,
            MOUNT_VOLUME,
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert_eq!(registry.len(), 19);
    }

    #[test]
    fn apt_package_install_pins_version() {
        let registry = registry(PackageManager::Apt);
        let op = registry.lookup(UPGRADE_KUBEADM).unwrap();
        let rendered = op
            .command()
            .render(&Params::new().with("version", "1.29.3").with("node", "n1"))
            .unwrap();
        assert_eq!(rendered.program, "apt-get");
        assert_eq!(
            rendered.args,
            vec!["install", "-y", "--allow-change-held-packages", "kubeadm=1.29.3-00"]
        );
    }

    #[test]
    fn yum_package_install_pins_version() {
        let registry = registry(PackageManager::Yum);
        let rendered = registry
            .lookup(UPGRADE_KUBELET)
            .unwrap()
            .command()
            .render(&Params::new().with("version", "1.29.3").with("node", "n1"))
            .unwrap();
        assert_eq!(rendered.program, "yum");
        assert_eq!(
            rendered.args,
            vec!["install", "-y", "kubelet-1.29.3-0", "kubectl-1.29.3-0"]
        );
    }

    #[test]
    fn etcd_snapshot_carries_connection_and_api_version() {
        let registry = registry(PackageManager::Apt);
        let op = registry.lookup(ETCD_SNAPSHOT_SAVE).unwrap();
        assert!(!op.is_idempotent());
        let rendered = op
            .command()
            .render(
                &Params::new()
                    .with("snapshot_path", "/var/lib/steward/snapshots/s1.db")
                    .with("member", "cp-1"),
            )
            .unwrap();
        assert_eq!(rendered.env.get("ETCDCTL_API").map(String::as_str), Some("3"));
        assert_eq!(
            rendered.args[..3].to_vec(),
            vec!["snapshot", "save", "/var/lib/steward/snapshots/s1.db"]
        );
        assert!(rendered.args.contains(&"--endpoints=https://127.0.0.1:2379".to_owned()));
    }

    #[test]
    fn mount_drops_unbound_options() {
        let registry = registry(PackageManager::Apt);
        let rendered = registry
            .lookup(MOUNT_VOLUME)
            .unwrap()
            .command()
            .render(&Params::new().with("device", "/dev/sdb1").with("path", "/data"))
            .unwrap();
        assert_eq!(rendered.args, vec!["/dev/sdb1", "/data"]);
    }

    #[test]
    fn jsonpath_braces_survive_rendering() {
        let registry = registry(PackageManager::Apt);
        let probe = registry
            .lookup(KUBEADM_UPGRADE_APPLY)
            .unwrap()
            .reconcile()
            .unwrap()
            .render(&Params::new().with("version", "1.29.3").with("node", "cp-1"))
            .unwrap();
        assert!(probe.command.args.contains(&"jsonpath={..image}".to_owned()));
    }

    fn with_store(store: BackupStore) -> OperationRegistry {
        standard_registry(&CatalogConfig {
            backup_store: Some(store),
            ..CatalogConfig::default()
        })
        .unwrap()
    }

    fn snapshot() -> Params {
        Params::new()
            .with("snapshot_path", "/var/lib/steward/snapshots/nightly.db")
            .with("snapshot_name", "nightly")
    }

    #[test]
    fn upload_registered_only_with_a_store() {
        assert!(!registry(PackageManager::Apt).contains(UPLOAD_SNAPSHOT));
        let registry = with_store(BackupStore {
            kind: StoreKind::Gcs,
            bucket: "backups".into(),
            endpoint: None,
            prefix: default_store_prefix(),
        });
        assert_eq!(registry.len(), 20);
        let op = registry.lookup(UPLOAD_SNAPSHOT).unwrap();
        assert!(op.must_reconcile());
        let rendered = op.command().render(&snapshot()).unwrap();
        assert_eq!(rendered.program, "gcloud");
        assert_eq!(
            rendered.args,
            vec![
                "storage",
                "cp",
                "/var/lib/steward/snapshots/nightly.db",
                "gs://backups/etcd-snapshots/nightly.db",
            ]
        );
    }

    #[test]
    fn s3_upload_passes_endpoint_to_copy_and_listing() {
        let registry = with_store(BackupStore {
            kind: StoreKind::S3,
            bucket: "backups".into(),
            endpoint: Some("http://minio:9000".into()),
            prefix: "/etcd/".into(),
        });
        let op = registry.lookup(UPLOAD_SNAPSHOT).unwrap();
        let copy = op.command().render(&snapshot()).unwrap();
        assert_eq!(copy.program, "aws");
        assert_eq!(
            copy.args,
            vec![
                "s3",
                "cp",
                "/var/lib/steward/snapshots/nightly.db",
                "s3://backups/etcd/nightly.db",
                "--endpoint-url=http://minio:9000",
            ]
        );
        let check = op.reconcile().unwrap().render(&snapshot()).unwrap();
        assert_eq!(
            check.command.args,
            vec!["s3", "ls", "s3://backups/etcd/nightly.db", "--endpoint-url=http://minio:9000"]
        );
    }

    #[test]
    fn store_config_reads_type_key() {
        let store: BackupStore =
            serde_json::from_value(serde_json::json!({"type": "s3", "bucket": "b"})).unwrap();
        assert_eq!(store.kind, StoreKind::S3);
        assert_eq!(store.prefix, "etcd-snapshots");
        assert_eq!(store.endpoint, None);
    }

    #[test]
    fn literal_escapes_braces_in_paths() {
        let config = CatalogConfig {
            binaries: Binaries {
                kubectl: "/opt/{odd}/kubectl".into(),
                ..Binaries::default()
            },
            ..CatalogConfig::default()
        };
        let registry = standard_registry(&config).unwrap();
        let rendered = registry
            .lookup(CORDON_NODE)
            .unwrap()
            .command()
            .render(&Params::new().with("node", "n1"))
            .unwrap();
        assert_eq!(rendered.program, "/opt/{odd}/kubectl");
    }
}
