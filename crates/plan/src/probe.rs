//! Read-only probes: preconditions and reconciliation checks.

use serde::{Deserialize, Serialize};
use steward_core::Params;

use crate::command::{CommandTemplate, RenderedCommand, render_str};
use crate::error::PlanError;

/// What a probe's result must look like for the probe to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    /// The probe exits with status zero.
    ExitZero,
    /// The probe exits with a non-zero status.
    ExitNonZero,
    /// The probe exits zero and its stdout contains the (rendered) text.
    StdoutContains(String),
}

impl Expectation {
    /// Evaluate the expectation against a finished probe.
    #[must_use]
    pub fn holds(&self, exit_ok: bool, stdout: &str) -> bool {
        match self {
            Self::ExitZero => exit_ok,
            Self::ExitNonZero => !exit_ok,
            Self::StdoutContains(needle) => exit_ok && stdout.contains(needle.as_str()),
        }
    }
}

/// A read-only command plus the expectation it is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// The command to run.
    pub command: CommandTemplate,
    /// How to judge its result.
    pub expect: Expectation,
}

impl Probe {
    /// A probe that holds when `command` exits zero.
    #[must_use]
    pub fn exit_zero(command: CommandTemplate) -> Self {
        Self {
            command,
            expect: Expectation::ExitZero,
        }
    }

    /// A probe that holds when `command` exits non-zero.
    #[must_use]
    pub fn exit_non_zero(command: CommandTemplate) -> Self {
        Self {
            command,
            expect: Expectation::ExitNonZero,
        }
    }

    /// A probe that holds when `command` prints `needle` (a template).
    #[must_use]
    pub fn stdout_contains(command: CommandTemplate, needle: impl Into<String>) -> Self {
        Self {
            command,
            expect: Expectation::StdoutContains(needle.into()),
        }
    }

    /// Bind parameters into the command and the expectation.
    pub fn render(&self, params: &Params) -> Result<RenderedProbe, PlanError> {
        let command = self.command.render(params)?;
        let expect = match &self.expect {
            Expectation::StdoutContains(needle) => Expectation::StdoutContains(
                render_str(needle, params)?.unwrap_or_default(),
            ),
            other => other.clone(),
        };
        Ok(RenderedProbe { command, expect })
    }
}

/// A probe with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedProbe {
    /// Concrete command.
    pub command: RenderedCommand,
    /// Concrete expectation.
    pub expect: Expectation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Expectation::ExitZero, true, "", true)]
    #[case(Expectation::ExitZero, false, "", false)]
    #[case(Expectation::ExitNonZero, false, "", true)]
    #[case(Expectation::ExitNonZero, true, "", false)]
    #[case(Expectation::StdoutContains("v1.29.3".into()), true, "kubeadm v1.29.3\n", true)]
    #[case(Expectation::StdoutContains("v1.29.3".into()), false, "v1.29.3", false)]
    #[case(Expectation::StdoutContains("v1.29.3".into()), true, "v1.28.0", false)]
    fn expectation_holds(
        #[case] expect: Expectation,
        #[case] exit_ok: bool,
        #[case] stdout: &str,
        #[case] holds: bool,
    ) {
        assert_eq!(expect.holds(exit_ok, stdout), holds);
    }

    #[test]
    fn render_substitutes_needle() {
        let probe = Probe::stdout_contains(
            CommandTemplate::new("kubeadm").args(["version", "-o", "short"]),
            "v{version}",
        );
        let rendered = probe.render(&Params::new().with("version", "1.29.3")).unwrap();
        assert_eq!(rendered.expect, Expectation::StdoutContains("v1.29.3".into()));
        assert_eq!(rendered.command.args, vec!["version", "-o", "short"]);
    }

    #[test]
    fn render_reports_unbound_needle() {
        let probe = Probe::stdout_contains(CommandTemplate::new("kubelet"), "v{version}");
        assert!(matches!(
            probe.render(&Params::new()),
            Err(PlanError::UnboundPlaceholder { .. })
        ));
    }
}
