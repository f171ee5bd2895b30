//! Subcommand implementations.

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use steward_engine::{Orchestrator, PlanReport};
use steward_execution::PlanStatus;
use steward_journal::FileJournal;
use steward_plan::catalog::standard_registry;
use steward_runtime::ProcessExecutor;

use crate::config::AppConfig;

pub mod agent;
pub mod resume;
pub mod run;
pub mod status;

/// Exit code for a plan that failed and rolled back.
const EXIT_FAILED: u8 = 1;
/// Exit code for a plan waiting for an operator.
const EXIT_NEEDS_REVIEW: u8 = 2;

/// Orchestrator over the real executor and the configured journal directory.
pub async fn orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let mut catalog = config.catalog.clone();
    catalog.package_manager = catalog.package_manager.resolve(on_path);
    tracing::debug!(package_manager = ?catalog.package_manager, "operation catalog");
    let registry =
        standard_registry(&catalog).context("invalid operation catalog configuration")?;
    let journal = FileJournal::open(config.journal_dir.clone())
        .await
        .with_context(|| format!("cannot open journal at {}", config.journal_dir.display()))?;
    Ok(Orchestrator::new(
        Arc::new(registry),
        Arc::new(ProcessExecutor::new()),
        Arc::new(journal),
        config.orchestrator.clone(),
    )?)
}

/// Whether `binary` is an executable file in one of the `PATH` directories.
fn on_path(binary: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|path| {
        std::env::split_paths(&path).any(|dir| dir.join(binary).is_file())
    })
}

/// Process exit code summarising `reports`: the worst outcome wins.
pub fn exit_code<'a>(reports: impl IntoIterator<Item = &'a PlanReport>) -> ExitCode {
    ExitCode::from(worst(reports.into_iter().map(PlanReport::status)))
}

fn worst(statuses: impl IntoIterator<Item = PlanStatus>) -> u8 {
    statuses
        .into_iter()
        .map(|status| match status {
            PlanStatus::NeedsOperatorReview => EXIT_NEEDS_REVIEW,
            PlanStatus::Failed | PlanStatus::RolledBack => EXIT_FAILED,
            PlanStatus::Building | PlanStatus::Executing | PlanStatus::Succeeded => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
