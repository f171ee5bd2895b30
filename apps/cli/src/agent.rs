//! `steward agent`: recover the journal, then turn upgrade requests posted as
//! node annotations, and backup requests posted as ConfigMaps, into plans.

use std::sync::Arc;
use std::time::Duration;

use steward_core::constants::{ANNOTATION_STATUS, LABEL_BACKUP_REQUEST};
use steward_engine::{EngineError, Orchestrator, PlanSnapshot};
use steward_plan::TaskKind;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::node::{BackupRequest, ConfigMapApi, NodeApi, RequestStatus, snapshot_location};

/// How backup request ConfigMaps are handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    /// Namespace holding request and status ConfigMaps.
    pub namespace: String,
    /// Directory snapshots are written to.
    pub snapshot_dir: String,
    /// Copy verified snapshots to the configured object store.
    pub upload: bool,
}

/// Reconcile loop for one node.
pub struct Agent<N> {
    node: String,
    api: N,
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    backups: Option<BackupSettings>,
}

impl<N: NodeApi + ConfigMapApi> Agent<N> {
    /// Agent managing `node`, polling every `interval`.
    pub fn new(
        node: impl Into<String>,
        api: N,
        orchestrator: Arc<Orchestrator>,
        interval: Duration,
    ) -> Self {
        Self {
            node: node.into(),
            api,
            orchestrator,
            interval,
            backups: None,
        }
    }

    /// Also serve backup request ConfigMaps.
    #[must_use]
    pub fn with_backups(mut self, settings: BackupSettings) -> Self {
        self.backups = Some(settings);
        self
    }

    /// Resume unfinished plans, then poll until `shutdown` fires.
    pub async fn run(&self, shutdown: &CancellationToken) -> anyhow::Result<()> {
        let resumed = self.orchestrator.resume_all(shutdown).await?;
        tracing::info!(node = %self.node, resumed = resumed.len(), "journal recovered");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.tick(shutdown).await {
                tracing::warn!(node = %self.node, error = %format_args!("{err:#}"), "reconcile failed");
            }
        }
        tracing::info!(node = %self.node, "agent stopped");
        Ok(())
    }

    /// One pass over the node's annotations and the backup requests. A
    /// failing upgrade pass does not hold back the backups.
    pub async fn tick(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let upgrade = self.reconcile_upgrade(cancel).await;
        let backups = match &self.backups {
            Some(settings) => self.reconcile_backups(settings, cancel).await,
            None => Ok(()),
        };
        upgrade.and(backups)
    }

    async fn reconcile_upgrade(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let info = self.api.get(&self.node).await?;
        let Some(operation_id) = info.operation_id() else {
            return Ok(());
        };
        let current = info.request_status();

        // A plan already exists for this request: only its status is reported.
        if let Some(plan) = self.latest_plan(operation_id, TaskKind::UpgradeNode) {
            if let Some(status) = RequestStatus::for_plan(plan.status)
                && current != Some(status)
            {
                tracing::info!(%operation_id, plan_id = %plan.plan_id, %status, "reporting plan status");
                self.annotate(status).await?;
            }
            return Ok(());
        }

        match current {
            Some(RequestStatus::Pending) => {}
            Some(RequestStatus::Running) => {
                tracing::warn!(%operation_id, "request marked running but never journaled; requeueing");
                return self.annotate(RequestStatus::Pending).await;
            }
            _ => return Ok(()),
        }

        let task = match info.pending_upgrade() {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(()),
            Err(err) => {
                tracing::error!(%operation_id, error = %err, "rejecting upgrade request");
                return self.annotate(RequestStatus::Failed).await;
            }
        };

        self.annotate(RequestStatus::Running).await?;
        match self.orchestrator.run(&task, cancel).await {
            Ok(report) => {
                tracing::info!(
                    %operation_id,
                    plan_id = %report.plan_id(),
                    status = %report.status(),
                    "upgrade finished"
                );
                if let Some(status) = RequestStatus::for_plan(report.status()) {
                    self.annotate(status).await?;
                }
                Ok(())
            }
            Err(EngineError::Plan(err)) => {
                tracing::error!(%operation_id, error = %err, "upgrade request cannot be planned");
                self.annotate(RequestStatus::Failed).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn reconcile_backups(
        &self,
        settings: &BackupSettings,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let selector = format!("{LABEL_BACKUP_REQUEST}=true");
        let requests = self
            .api
            .list_config_maps(&settings.namespace, &selector)
            .await?;
        for config_map in requests {
            if config_map.data.get("node_name").map(|n| n.trim()) != Some(self.node.as_str()) {
                continue;
            }
            match BackupRequest::parse(&config_map) {
                Ok(request) => self.serve_backup(settings, &request, cancel).await?,
                Err(err) => {
                    tracing::error!(config_map = %config_map.name, error = %err, "ignoring backup request");
                }
            }
        }
        Ok(())
    }

    /// Run (or look up) the snapshot plan for one request, record the
    /// outcome in its status ConfigMap and delete the request. A plan that
    /// has not finished leaves the request in place for the next tick.
    async fn serve_backup(
        &self,
        settings: &BackupSettings,
        request: &BackupRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let operation_id = request.operation_id.as_str();
        let task = request.task(&settings.snapshot_dir, settings.upload);
        let plan = match self.latest_plan(operation_id, TaskKind::EtcdSnapshot) {
            Some(plan) => Ok(plan.as_ref().clone()),
            None => {
                tracing::info!(%operation_id, snapshot = %request.snapshot_name, "processing backup request");
                match self.orchestrator.run(&task, cancel).await {
                    Ok(report) => Ok(report.snapshot),
                    Err(EngineError::Plan(err)) => Err(err.to_string()),
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let (success, message) = match plan {
            Ok(plan) => {
                if RequestStatus::for_plan(plan.status).is_none() {
                    return Ok(());
                }
                if plan.status.is_success() {
                    (true, snapshot_location(&task))
                } else {
                    (false, failure_message(&plan))
                }
            }
            Err(message) => (false, message),
        };
        if success {
            tracing::info!(%operation_id, %message, "backup completed");
        } else {
            tracing::error!(%operation_id, %message, "backup failed");
        }

        let data = request.status_data(success, &message, chrono::Utc::now());
        self.api
            .put_config_map(&settings.namespace, &request.status_name(), &data)
            .await?;
        self.api
            .delete_config_map(&settings.namespace, &request.config_map)
            .await
    }

    fn latest_plan(&self, request_id: &str, kind: TaskKind) -> Option<Arc<PlanSnapshot>> {
        self.orchestrator
            .board()
            .list()
            .into_iter()
            .rev()
            .find(|plan| plan.request_id == request_id && plan.task == kind)
    }

    async fn annotate(&self, status: RequestStatus) -> anyhow::Result<()> {
        self.api
            .annotate(&self.node, ANNOTATION_STATUS, status.as_str())
            .await
    }
}

fn failure_message(plan: &PlanSnapshot) -> String {
    plan.steps
        .iter()
        .find_map(|step| {
            step.last_error
                .as_ref()
                .map(|error| format!("{}: {error}", step.key))
        })
        .unwrap_or_else(|| format!("plan {} ended {}", plan.plan_id, plan.status))
}
