//! `steward agent`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, BackupSettings};
use crate::config::AppConfig;
use crate::node::Kubectl;
use crate::server;

pub async fn execute(config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<ExitCode> {
    let node = config
        .node_name
        .clone()
        .context("agent needs a node name (--node, NODE_NAME or node_name in the config file)")?;
    let orchestrator = Arc::new(super::orchestrator(config).await?);

    let server = {
        let listen = config.listen.clone();
        let board = Arc::clone(orchestrator.board());
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server::serve(&listen, board, shutdown).await })
    };

    let kubectl = Kubectl::new(
        config.catalog.binaries.kubectl.clone(),
        config.orchestrator.timeouts.cluster_api,
    );
    tracing::info!(
        %node,
        interval = ?config.reconcile_interval,
        backups = config.backup.enabled,
        upload = config.catalog.backup_store.is_some(),
        "agent starting"
    );
    let mut agent = Agent::new(node, kubectl, orchestrator, config.reconcile_interval);
    if config.backup.enabled {
        agent = agent.with_backups(BackupSettings {
            namespace: config.backup.namespace.clone(),
            snapshot_dir: config.backup.snapshot_dir.clone(),
            upload: config.catalog.backup_store.is_some(),
        });
    }
    let result = agent.run(&shutdown).await;

    shutdown.cancel();
    server.await.context("status endpoint task panicked")??;
    result.map(|()| ExitCode::SUCCESS)
}
