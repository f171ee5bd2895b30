//! The three-way result of an external call.

use std::fmt;

use steward_execution::{FailureCategory, OutputSnapshot};

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Classification.
    pub category: FailureCategory,
    /// Operator-facing message.
    pub message: String,
    /// Captured output, when the process ran.
    pub output: Option<OutputSnapshot>,
}

impl Failure {
    /// A failure without captured output.
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            output: None,
        }
    }

    /// Attach captured output.
    pub fn with_output(mut self, output: OutputSnapshot) -> Self {
        self.output = Some(output);
        self
    }

    /// Returns `true` if the call hit its deadline.
    pub fn is_timeout(&self) -> bool {
        self.category == FailureCategory::Timeout
    }

    /// Returns `true` if the process ran to completion and gave an answer,
    /// as opposed to never reaching its target.
    pub fn is_answer(&self) -> bool {
        let ran = self.output.as_ref().is_some_and(|o| o.exit_code.is_some());
        ran && !matches!(
            self.category,
            FailureCategory::Timeout
                | FailureCategory::Network
                | FailureCategory::EtcdUnavailable
                | FailureCategory::Forbidden
                | FailureCategory::Spawn
        )
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Result of one call. The executor never retries; the orchestrator decides
/// what a retryable outcome means for the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded.
    Success(OutputSnapshot),
    /// The call failed in a way that may clear up.
    Retryable(Failure),
    /// The call failed and repeating it will not help.
    Fatal(Failure),
}

impl Outcome {
    /// Success with empty output.
    pub fn ok() -> Self {
        Self::Success(OutputSnapshot::default())
    }

    /// Success with the given stdout and exit code 0.
    pub fn ok_with_stdout(stdout: &str) -> Self {
        Self::Success(OutputSnapshot::capture(Some(0), stdout, ""))
    }

    /// Retryable failure without output.
    pub fn retryable(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Retryable(Failure::new(category, message))
    }

    /// Fatal failure without output.
    pub fn fatal(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Fatal(Failure::new(category, message))
    }

    /// Returns `true` on success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Retryable(f) | Self::Fatal(f) => Some(f),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Retryable(_) => "retryable",
            Self::Fatal(_) => "fatal",
        }
    }
}
