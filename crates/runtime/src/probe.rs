//! Judge a probe's outcome against its expectation.

use steward_plan::Expectation;

use crate::outcome::{Failure, Outcome};

/// What a read-only probe told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The expectation holds.
    Holds,
    /// The probe ran and the expectation does not hold.
    DoesNotHold {
        /// What the probe observed.
        observed: String,
    },
    /// The probe could not observe the target.
    Unobservable(Failure),
}

impl ProbeVerdict {
    /// Returns `true` if the expectation holds.
    pub fn holds(&self) -> bool {
        matches!(self, Self::Holds)
    }
}

/// Judge `outcome` of a probe command.
///
/// A probe that exits non-zero still answers the question (for example
/// `kubectl get node` reporting `NotFound`); one that timed out, could not
/// reach its target or could not start does not.
pub fn judge(expect: &Expectation, outcome: &Outcome) -> ProbeVerdict {
    let (exit_ok, stdout, observed) = match outcome {
        Outcome::Success(output) => (true, output.stdout.as_str(), "exit 0".to_owned()),
        Outcome::Retryable(failure) | Outcome::Fatal(failure) if failure.is_answer() => {
            let stdout = failure.output.as_ref().map_or("", |o| o.stdout.as_str());
            (false, stdout, failure.to_string())
        }
        Outcome::Retryable(failure) | Outcome::Fatal(failure) => {
            return ProbeVerdict::Unobservable(failure.clone());
        }
    };
    if expect.holds(exit_ok, stdout) {
        ProbeVerdict::Holds
    } else {
        ProbeVerdict::DoesNotHold { observed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use steward_execution::{FailureCategory, OutputSnapshot};

    fn answered_no(stderr: &str) -> Outcome {
        Outcome::Fatal(
            Failure::new(FailureCategory::NotFound, stderr)
                .with_output(OutputSnapshot::capture(Some(1), "", stderr)),
        )
    }

    #[test]
    fn exit_zero_expectation() {
        assert!(judge(&Expectation::ExitZero, &Outcome::ok()).holds());
        assert!(matches!(
            judge(&Expectation::ExitZero, &answered_no("nodes \"w1\" not found")),
            ProbeVerdict::DoesNotHold { .. }
        ));
    }

    #[test]
    fn exit_non_zero_expectation_accepts_not_found() {
        let verdict = judge(&Expectation::ExitNonZero, &answered_no("nodes \"w1\" not found"));
        assert_eq!(verdict, ProbeVerdict::Holds);
        assert!(!judge(&Expectation::ExitNonZero, &Outcome::ok()).holds());
    }

    #[test]
    fn stdout_contains_expectation() {
        let expect = Expectation::StdoutContains("v1.29.3".into());
        assert!(judge(&expect, &Outcome::ok_with_stdout("registry.k8s.io/kube-apiserver:v1.29.3")).holds());
        assert!(!judge(&expect, &Outcome::ok_with_stdout("registry.k8s.io/kube-apiserver:v1.28.9")).holds());
    }

    #[test]
    fn timeouts_are_unobservable() {
        let outcome = Outcome::retryable(FailureCategory::Timeout, "timed out after 30s");
        match judge(&Expectation::ExitNonZero, &outcome) {
            ProbeVerdict::Unobservable(failure) => assert!(failure.is_timeout()),
            other => panic!("expected unobservable, got {other:?}"),
        }
    }
}
