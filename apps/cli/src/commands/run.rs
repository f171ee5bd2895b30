//! `steward run`

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;
use crate::config::AppConfig;

pub async fn execute(
    config: &AppConfig,
    args: RunArgs,
    shutdown: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let request_id = args
        .request_id
        .unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));
    let task = args.task.into_task(request_id);
    let orchestrator = super::orchestrator(config).await?;

    let report = orchestrator.run(&task, shutdown).await?;
    super::print_json(&report)?;
    Ok(super::exit_code([&report]))
}
