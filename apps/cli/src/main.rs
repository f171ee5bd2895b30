//! `steward`: crash-safe node maintenance for Kubernetes clusters.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;

mod agent;
mod cli;
mod commands;
mod config;
mod node;
mod server;
mod signal;

use cli::{Cli, Command};
use config::{AppConfig, LogOverrides, Overrides};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format_args!("{err:#}"), "steward failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref(), &overrides(&cli)?)?;
    let _log = steward_log::init_with(config.log.clone()).context("cannot install logger")?;
    let shutdown = signal::shutdown_token();

    match cli.command {
        Command::Run(args) => commands::run::execute(&config, args, &shutdown).await,
        Command::Resume { plan_id, .. } => {
            commands::resume::execute(&config, plan_id, &shutdown).await
        }
        Command::Status { plan_id } => commands::status::execute(&config, plan_id).await,
        Command::Agent { .. } => commands::agent::execute(&config, shutdown).await,
    }
}

fn overrides(cli: &Cli) -> anyhow::Result<Overrides> {
    let (node_name, listen) = match &cli.command {
        Command::Agent { node, listen } => (node.clone(), listen.clone()),
        _ => (None, None),
    };
    let format = cli
        .log_format
        .as_deref()
        .map(str::parse::<steward_log::Format>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    Ok(Overrides {
        node_name,
        journal_dir: cli.journal_dir.clone(),
        listen,
        log: LogOverrides {
            level: cli.log_level.clone(),
            format,
        },
    })
}
