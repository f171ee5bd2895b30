//! Executor that replays scripted outcomes instead of running anything.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use steward_core::StepId;
use steward_plan::RenderedCommand;
use tokio::time::Instant;

use crate::executor::CommandExecutor;
use crate::outcome::Outcome;
use crate::request::{CallKind, ExecutionRequest};

/// One scripted reply.
#[derive(Debug, Clone)]
struct Reply {
    delay: Duration,
    outcome: Outcome,
}

/// A call the scripted executor answered.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Step of the call.
    pub step: StepId,
    /// Operation name.
    pub operation: String,
    /// Why the call ran.
    pub call: CallKind,
    /// Attempt number.
    pub attempt: u32,
    /// The rendered command.
    pub command: RenderedCommand,
    /// When the call started.
    pub started: Instant,
    /// When the call returned.
    pub finished: Instant,
    /// What it returned.
    pub outcome: Outcome,
}

/// Test executor: per `(operation, call kind)` queues of outcomes.
///
/// Unscripted calls succeed with empty output after the default delay.
/// Every call is recorded with its start and end instants, so tests can
/// check ordering and overlap.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<(String, CallKind), VecDeque<Reply>>>,
    default_delay: Duration,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedExecutor {
    /// An executor that succeeds instantly unless scripted otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to unscripted calls and to `then`.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Queue `outcome` for the next `call` of `operation`.
    pub fn then(&self, operation: &str, call: CallKind, outcome: Outcome) -> &Self {
        self.then_after(operation, call, self.default_delay, outcome)
    }

    /// Queue `outcome`, returned after `delay`.
    pub fn then_after(
        &self,
        operation: &str,
        call: CallKind,
        delay: Duration,
        outcome: Outcome,
    ) -> &Self {
        self.scripts
            .lock()
            .entry((operation.to_owned(), call))
            .or_default()
            .push_back(Reply { delay, outcome });
        self
    }

    /// Every call so far, in start order.
    pub fn calls(&self) -> Vec<CallRecord> {
        let mut calls = self.calls.lock().clone();
        calls.sort_by_key(|c| c.started);
        calls
    }

    /// Calls of one operation and kind.
    pub fn calls_of(&self, operation: &str, call: CallKind) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation && c.call == call)
            .collect()
    }

    /// Number of calls of one operation and kind.
    pub fn count(&self, operation: &str, call: CallKind) -> usize {
        self.calls_of(operation, call).len()
    }

    /// Scripted replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.scripts.lock().values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Outcome {
        let reply = self
            .scripts
            .lock()
            .get_mut(&(request.operation.clone(), request.call))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply {
                delay: self.default_delay,
                outcome: Outcome::ok(),
            });

        let started = Instant::now();
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        let finished = Instant::now();

        self.calls.lock().push(CallRecord {
            step: request.step,
            operation: request.operation.clone(),
            call: request.call,
            attempt: request.attempt,
            command: request.command.clone(),
            started,
            finished,
            outcome: reply.outcome.clone(),
        });
        reply.outcome
    }
}
