//! Operation descriptors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use steward_core::{ParamKind, ParamSpec, Params, TargetKind, TargetLock, TargetLockError};

use crate::command::CommandTemplate;
use crate::probe::Probe;

/// Namespace of the lock derived from a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// `node/<value>`
    Node,
    /// `etcd/<value>`
    EtcdMember,
    /// `mount/<value>`
    Mount,
    /// The value is used as the key verbatim.
    Raw,
}

/// Which parameter names the entity an operation mutates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSpec {
    /// Lock namespace.
    pub scope: LockScope,
    /// Parameter whose value is the lock key.
    pub param: String,
}

impl LockSpec {
    /// Derive the concrete lock from bound parameters.
    pub fn resolve(&self, params: &Params) -> Result<TargetLock, TargetLockError> {
        let value = params.render(&self.param).unwrap_or_default();
        match self.scope {
            LockScope::Node => TargetLock::node(&value),
            LockScope::EtcdMember => TargetLock::etcd_member(&value),
            LockScope::Mount => TargetLock::mount(&value),
            LockScope::Raw => TargetLock::new(&value),
        }
    }
}

/// An immutable description of one kind of privileged action.
///
/// Built with the fluent methods below and registered once at start-up in
/// an [`OperationRegistry`](crate::OperationRegistry).
///
/// # Examples
///
/// ```
/// use steward_core::{ParamKind, TargetKind};
/// use steward_plan::{CommandTemplate, LockScope, Operation};
///
/// let cordon = Operation::new(
///     "cordon-node",
///     TargetKind::ClusterApi,
///     CommandTemplate::new("kubectl").args(["cordon", "{node}"]),
/// )
/// .idempotent()
/// .compensated_by("uncordon-node")
/// .param("node", ParamKind::String)
/// .lock(LockScope::Node, "node");
///
/// assert!(cordon.is_idempotent());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    kind: TargetKind,
    idempotent: bool,
    compensation: Option<String>,
    params: Vec<ParamSpec>,
    preconditions: Vec<Probe>,
    command: CommandTemplate,
    reconcile: Option<Probe>,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
    lock: Option<LockSpec>,
    resume_after_ambiguous: bool,
}

impl Operation {
    /// A non-idempotent operation with no compensation, parameters or checks.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TargetKind, command: CommandTemplate) -> Self {
        Self {
            name: name.into(),
            kind,
            idempotent: false,
            compensation: None,
            params: Vec::new(),
            preconditions: Vec::new(),
            command,
            reconcile: None,
            max_attempts: None,
            timeout: None,
            lock: None,
            resume_after_ambiguous: false,
        }
    }

    /// Mark the operation safe to repeat.
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Name the operation that undoes this one.
    #[must_use]
    pub fn compensated_by(mut self, name: impl Into<String>) -> Self {
        self.compensation = Some(name.into());
        self
    }

    /// Declare a required parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec::required(name, kind));
        self
    }

    /// Declare an optional parameter.
    #[must_use]
    pub fn optional_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec::optional(name, kind));
        self
    }

    /// Add a precondition checked before every action attempt.
    #[must_use]
    pub fn precondition(mut self, probe: Probe) -> Self {
        self.preconditions.push(probe);
        self
    }

    /// Declare the check that tells whether an ambiguous attempt took effect.
    #[must_use]
    pub fn reconcile_with(mut self, probe: Probe) -> Self {
        self.reconcile = Some(probe);
        self
    }

    /// Override the configured default attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Override the configured per-kind timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Serialize steps on the entity named by parameter `param`.
    #[must_use]
    pub fn lock(mut self, scope: LockScope, param: impl Into<String>) -> Self {
        self.lock = Some(LockSpec {
            scope,
            param: param.into(),
        });
        self
    }

    /// Allow a re-run after an ambiguous outcome without reconciliation.
    ///
    /// Only valid for idempotent operations or operations with a
    /// reconciliation check; the registry rejects anything else.
    #[must_use]
    pub fn resume_after_ambiguous(mut self) -> Self {
        self.resume_after_ambiguous = true;
        self
    }

    /// Unique operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target kind; selects the executor timeout and classification rules.
    #[must_use]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Whether repeating the operation is harmless.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// Name of the compensating operation, if any.
    #[must_use]
    pub fn compensation(&self) -> Option<&str> {
        self.compensation.as_deref()
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Preconditions.
    #[must_use]
    pub fn preconditions(&self) -> &[Probe] {
        &self.preconditions
    }

    /// The external action.
    #[must_use]
    pub fn command(&self) -> &CommandTemplate {
        &self.command
    }

    /// Reconciliation check.
    #[must_use]
    pub fn reconcile(&self) -> Option<&Probe> {
        self.reconcile.as_ref()
    }

    /// Per-operation attempt budget override.
    #[must_use]
    pub fn attempt_limit(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Per-operation timeout override.
    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Lock declaration.
    #[must_use]
    pub fn lock_spec(&self) -> Option<&LockSpec> {
        self.lock.as_ref()
    }

    /// Whether an ambiguous outcome may be retried blindly.
    #[must_use]
    pub fn may_resume_after_ambiguous(&self) -> bool {
        self.resume_after_ambiguous
    }

    /// Whether a retry after an unknown outcome is safe without asking the
    /// target first.
    ///
    /// Host operations that declare a check always ask it: a repeated
    /// `mount` or `umount` is not harmless even when the end state is.
    #[must_use]
    pub fn retry_is_safe(&self) -> bool {
        if self.must_reconcile() {
            return false;
        }
        self.idempotent || self.resume_after_ambiguous
    }

    /// Timeouts and interrupted attempts go through the reconciliation
    /// check regardless of idempotency.
    #[must_use]
    pub fn must_reconcile(&self) -> bool {
        self.kind == TargetKind::Host && self.reconcile.is_some()
    }
}
