//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use steward_plan::{MaintenanceTask, TaskKind};

/// Steward: crash-safe node maintenance for Kubernetes clusters.
#[derive(Debug, Parser)]
#[command(name = "steward", version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(long, short, global = true, env = "STEWARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding plan journals.
    #[arg(long, global = true)]
    pub journal_dir: Option<PathBuf>,

    /// Log filter directives, e.g. `steward_engine=debug,info`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: pretty, compact or json.
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build and execute a maintenance plan.
    Run(RunArgs),

    /// Continue plans left incomplete by a previous process.
    Resume {
        /// Plan to resume.
        #[arg(conflicts_with = "all", required_unless_present = "all")]
        plan_id: Option<String>,

        /// Resume every incomplete plan in the journal directory.
        #[arg(long)]
        all: bool,
    },

    /// Print plan status from the journal.
    Status {
        /// Plan to show; every journaled plan when omitted.
        plan_id: Option<String>,
    },

    /// Watch this node's annotations and run requested upgrades.
    Agent {
        /// Node this agent manages.
        #[arg(long, env = "NODE_NAME")]
        node: Option<String>,

        /// Status endpoint address.
        #[arg(long)]
        listen: Option<String>,
    },
}

/// `steward run`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Caller-supplied request id; a fresh one is generated when omitted.
    #[arg(long, global = true)]
    pub request_id: Option<String>,

    #[command(subcommand)]
    pub task: TaskArgs,
}

/// The task to plan.
#[derive(Debug, Subcommand)]
pub enum TaskArgs {
    /// Cordon and drain a node.
    DrainNode {
        /// Node name.
        #[arg(long)]
        node: String,

        /// Upper bound for `kubectl drain`, e.g. `10m`.
        #[arg(long)]
        drain_timeout: Option<String>,
    },

    /// Upgrade kubeadm, kubelet and optionally containerd on a node.
    UpgradeNode {
        /// Node name.
        #[arg(long)]
        node: String,

        /// Target Kubernetes version, with or without a leading `v`.
        #[arg(long)]
        version: String,

        /// `worker` or `control-plane`.
        #[arg(long, default_value = "worker")]
        role: String,

        /// Extra components to upgrade, e.g. `containerd`.
        #[arg(long, value_delimiter = ',')]
        components: Vec<String>,
    },

    /// Take and verify an etcd snapshot.
    EtcdSnapshot {
        /// etcd member name.
        #[arg(long)]
        member: String,

        /// Snapshot file name without extension.
        #[arg(long)]
        name: String,

        /// Directory receiving the snapshot.
        #[arg(long)]
        dir: Option<String>,

        /// Copy the verified snapshot to the configured backup store.
        #[arg(long)]
        upload: bool,
    },
}

impl TaskArgs {
    /// The maintenance task this command line describes.
    pub fn into_task(self, request_id: String) -> MaintenanceTask {
        match self {
            Self::DrainNode {
                node,
                drain_timeout,
            } => {
                let task = MaintenanceTask::new(request_id, TaskKind::DrainNode).with("node", node);
                match drain_timeout {
                    Some(timeout) => task.with("drain_timeout", timeout),
                    None => task,
                }
            }
            Self::UpgradeNode {
                node,
                version,
                role,
                components,
            } => MaintenanceTask::new(request_id, TaskKind::UpgradeNode)
                .with("node", node)
                .with("version", version)
                .with("role", role)
                .with("components", components),
            Self::EtcdSnapshot {
                member,
                name,
                dir,
                upload,
            } => {
                let task = MaintenanceTask::new(request_id, TaskKind::EtcdSnapshot)
                    .with("member", member)
                    .with("snapshot_name", name)
                    .with("upload", upload);
                match dir {
                    Some(dir) => task.with("snapshot_dir", dir),
                    None => task,
                }
            }
        }
    }
}
