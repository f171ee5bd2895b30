//! `steward status`: journal replay, no commands are run.

use std::process::ExitCode;

use anyhow::Context as _;
use steward_core::PlanId;

use crate::config::AppConfig;

pub async fn execute(config: &AppConfig, plan_id: Option<String>) -> anyhow::Result<ExitCode> {
    let orchestrator = super::orchestrator(config).await?;

    match plan_id {
        Some(raw) => {
            let plan_id = PlanId::parse(&raw).with_context(|| format!("invalid plan id `{raw}`"))?;
            let report = orchestrator.load_report(plan_id).await?;
            super::print_json(&report)?;
        }
        None => {
            let mut reports = Vec::new();
            for plan_id in orchestrator.journaled_plans().await? {
                match orchestrator.load_report(plan_id).await {
                    Ok(report) => reports.push(report.snapshot),
                    Err(err) => tracing::warn!(%plan_id, error = %err, "cannot replay plan"),
                }
            }
            reports.sort_by_key(|plan| plan.created_at);
            super::print_json(&reports)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
