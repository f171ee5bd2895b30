//! `steward resume`

use std::process::ExitCode;

use anyhow::Context as _;
use steward_core::PlanId;
use steward_engine::EngineError;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

pub async fn execute(
    config: &AppConfig,
    plan_id: Option<String>,
    shutdown: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let orchestrator = super::orchestrator(config).await?;

    let reports = match plan_id {
        Some(raw) => {
            let plan_id = PlanId::parse(&raw).with_context(|| format!("invalid plan id `{raw}`"))?;
            match orchestrator.resume(plan_id, shutdown).await {
                Ok(report) => vec![report],
                Err(EngineError::AlreadyFinished { status, .. }) => {
                    tracing::info!(%plan_id, %status, "plan already finished");
                    vec![orchestrator.load_report(plan_id).await?]
                }
                Err(err) => return Err(err.into()),
            }
        }
        None => orchestrator.resume_all(shutdown).await?,
    };

    super::print_json(&reports)?;
    Ok(super::exit_code(&reports))
}
