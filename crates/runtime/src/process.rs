//! Executor that spawns real binaries.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use steward_execution::{FailureCategory, OutputSnapshot};
use tokio::process::Command;
use tracing::Instrument;

use crate::classify::classify;
use crate::executor::CommandExecutor;
use crate::outcome::{Failure, Outcome};
use crate::request::ExecutionRequest;

/// Runs commands with `tokio::process`.
///
/// The child gets no stdin and is killed if the deadline passes. Only the
/// request's extra variables are added to the inherited environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create an executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Outcome {
        let span = tracing::debug_span!(
            "exec",
            step = %request.step,
            operation = %request.operation,
            call = %request.call,
            attempt = request.attempt,
        );
        run(request).instrument(span).await
    }
}

async fn run(request: &ExecutionRequest) -> Outcome {
    let command = &request.command;
    tracing::debug!(command = %command, timeout = ?request.timeout, "spawning");

    let child = Command::new(&command.program)
        .args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(e) => {
            let message = match e.kind() {
                ErrorKind::NotFound => format!("program `{}` not found", command.program),
                ErrorKind::PermissionDenied => {
                    format!("program `{}` is not executable", command.program)
                }
                _ => format!("failed to start `{}`: {e}", command.program),
            };
            tracing::warn!(%message, "spawn failed");
            return Outcome::fatal(FailureCategory::Spawn, message);
        }
    };

    let started = Instant::now();
    let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Outcome::fatal(
                FailureCategory::Spawn,
                format!("failed waiting for `{}`: {e}", command.program),
            );
        }
        Err(_) => {
            tracing::warn!(timeout = ?request.timeout, "call timed out, child killed");
            return Outcome::Retryable(
                Failure::new(
                    FailureCategory::Timeout,
                    format!("timed out after {}s", request.timeout.as_secs_f64()),
                )
                .with_output(OutputSnapshot::default()),
            );
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let outcome = classify(
        request.target,
        request.call,
        output.status.code(),
        &stdout,
        &stderr,
    );
    tracing::debug!(
        outcome = outcome.label(),
        exit_code = ?output.status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "call finished"
    );
    outcome
}
