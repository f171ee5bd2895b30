//! Map a finished process to an [`Outcome`].
//!
//! Classification looks at the exit status first and then at stderr (and
//! stdout, since `kubectl` and `etcdctl` print some errors there). Rules are
//! checked in order: target-specific patterns, then the shared ones.

use steward_core::TargetKind;
use steward_execution::{FailureCategory, OutputSnapshot};

use crate::outcome::{Failure, Outcome};
use crate::request::CallKind;

/// A stderr pattern and what it means.
struct Rule {
    needle: &'static str,
    category: FailureCategory,
    retryable: bool,
}

const fn retry(needle: &'static str, category: FailureCategory) -> Rule {
    Rule {
        needle,
        category,
        retryable: true,
    }
}

const fn fatal(needle: &'static str, category: FailureCategory) -> Rule {
    Rule {
        needle,
        category,
        retryable: false,
    }
}

const CLUSTER_RULES: &[Rule] = &[
    retry("the object has been modified", FailureCategory::Conflict),
    retry("operation cannot be fulfilled", FailureCategory::Conflict),
    retry("disruption budget", FailureCategory::Conflict),
    retry("too many requests", FailureCategory::Conflict),
    retry("unable to connect to the server", FailureCategory::Network),
    retry("was refused", FailureCategory::Network),
    retry("the server is currently unable", FailureCategory::Network),
    retry("etcdserver: leader changed", FailureCategory::EtcdUnavailable),
];

const ETCD_RULES: &[Rule] = &[
    retry("etcdserver: leader changed", FailureCategory::EtcdUnavailable),
    retry("etcdserver: no leader", FailureCategory::EtcdUnavailable),
    retry("etcdserver: not capable", FailureCategory::EtcdUnavailable),
    retry("etcdserver: too many requests", FailureCategory::EtcdUnavailable),
    retry("etcdserver: request timed out", FailureCategory::Timeout),
    retry("context deadline exceeded", FailureCategory::Timeout),
    retry("failed to dial", FailureCategory::Network),
];

const HOST_RULES: &[Rule] = &[
    retry("target is busy", FailureCategory::DeviceBusy),
    retry("device or resource busy", FailureCategory::DeviceBusy),
    retry("could not get lock", FailureCategory::DeviceBusy),
    retry("another app is currently holding the yum lock", FailureCategory::DeviceBusy),
    retry("resource temporarily unavailable", FailureCategory::DeviceBusy),
];

const SHARED_RULES: &[Rule] = &[
    retry("timed out", FailureCategory::Timeout),
    retry("timeout", FailureCategory::Timeout),
    retry("deadline exceeded", FailureCategory::Timeout),
    retry("connection refused", FailureCategory::Network),
    retry("connection reset", FailureCategory::Network),
    retry("no route to host", FailureCategory::Network),
    retry("network is unreachable", FailureCategory::Network),
    retry("temporary failure in name resolution", FailureCategory::Network),
    retry("tls handshake", FailureCategory::Network),
    retry("service unavailable", FailureCategory::Network),
    fatal("forbidden", FailureCategory::Forbidden),
    fatal("unauthorized", FailureCategory::Forbidden),
    fatal("permission denied", FailureCategory::Forbidden),
    fatal("operation not permitted", FailureCategory::Forbidden),
    fatal("must be run as root", FailureCategory::Forbidden),
    fatal("not found", FailureCategory::NotFound),
    fatal("no such file or directory", FailureCategory::NotFound),
    fatal("unknown flag", FailureCategory::InvalidInput),
    fatal("unknown command", FailureCategory::InvalidInput),
    fatal("invalid", FailureCategory::InvalidInput),
];

/// Host replies that mean the desired state already holds.
const HOST_ALREADY_DONE: &[&str] = &["already mounted", "not mounted"];

/// Classify a process that exited (or was killed) with `exit_code`.
pub fn classify(
    target: TargetKind,
    call: CallKind,
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Outcome {
    let output = OutputSnapshot::capture(exit_code, stdout, stderr);
    if exit_code == Some(0) {
        return Outcome::Success(output);
    }

    let text = format!("{stderr}\n{stdout}").to_lowercase();

    if target.is_host()
        && !call.is_probe()
        && HOST_ALREADY_DONE.iter().any(|needle| text.contains(needle))
    {
        tracing::debug!(?exit_code, "host reports desired state already holds");
        return Outcome::Success(output);
    }

    let specific = match target {
        TargetKind::ClusterApi => CLUSTER_RULES,
        TargetKind::Etcd => ETCD_RULES,
        TargetKind::Host => HOST_RULES,
    };
    let message = first_line(stderr, stdout, exit_code);
    let rule = specific
        .iter()
        .chain(SHARED_RULES)
        .find(|rule| text.contains(rule.needle));

    match rule {
        Some(rule) => {
            let failure = Failure::new(rule.category, message).with_output(output);
            if rule.retryable {
                Outcome::Retryable(failure)
            } else {
                Outcome::Fatal(failure)
            }
        }
        None => Outcome::Fatal(Failure::new(FailureCategory::Unknown, message).with_output(output)),
    }
}

/// First non-empty line of stderr, else stdout, else the exit status.
fn first_line(stderr: &str, stdout: &str, exit_code: Option<i32>) -> String {
    stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map_or_else(
            || match exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_owned(),
            },
            str::to_owned,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn category(outcome: &Outcome) -> Option<(FailureCategory, bool)> {
        match outcome {
            Outcome::Success(_) => None,
            Outcome::Retryable(f) => Some((f.category, true)),
            Outcome::Fatal(f) => Some((f.category, false)),
        }
    }

    #[rstest]
    #[case(TargetKind::ClusterApi, "Error from server (Conflict): Operation cannot be fulfilled on nodes \"w1\": the object has been modified", FailureCategory::Conflict, true)]
    #[case(TargetKind::ClusterApi, "error when evicting pods/\"web-1\": Cannot evict pod as it would violate the pod's disruption budget.", FailureCategory::Conflict, true)]
    #[case(TargetKind::ClusterApi, "The connection to the server 10.0.0.1:6443 was refused - did you specify the right host or port?", FailureCategory::Network, true)]
    #[case(TargetKind::ClusterApi, "Unable to connect to the server: dial tcp 10.0.0.1:6443: i/o timeout", FailureCategory::Network, true)]
    #[case(TargetKind::ClusterApi, "Error from server (NotFound): nodes \"w9\" not found", FailureCategory::NotFound, false)]
    #[case(TargetKind::ClusterApi, "Error from server (Forbidden): nodes is forbidden: User \"x\" cannot patch", FailureCategory::Forbidden, false)]
    #[case(TargetKind::Etcd, "Error: etcdserver: leader changed", FailureCategory::EtcdUnavailable, true)]
    #[case(TargetKind::Etcd, "{\"level\":\"warn\",\"msg\":\"retrying of unary invoker failed\",\"error\":\"context deadline exceeded\"}", FailureCategory::Timeout, true)]
    #[case(TargetKind::Host, "umount: /mnt/data: target is busy.", FailureCategory::DeviceBusy, true)]
    #[case(TargetKind::Host, "E: Could not get lock /var/lib/dpkg/lock-frontend. It is held by process 1234", FailureCategory::DeviceBusy, true)]
    #[case(TargetKind::Host, "mount: /mnt/data: permission denied.", FailureCategory::Forbidden, false)]
    #[case(TargetKind::Host, "something unexpected happened", FailureCategory::Unknown, false)]
    fn classifies_stderr(
        #[case] target: TargetKind,
        #[case] stderr: &str,
        #[case] expected: FailureCategory,
        #[case] retryable: bool,
    ) {
        let outcome = classify(target, CallKind::Action, Some(1), "", stderr);
        let (got, got_retryable) = category(&outcome).unwrap();
        assert_eq!((got, got_retryable), (expected, retryable));
    }

    #[rstest]
    #[case("mount: /mnt/data: /dev/sdb1 already mounted on /mnt/data.")]
    #[case("umount: /mnt/data: not mounted.")]
    fn host_already_done_is_success(#[case] stderr: &str) {
        let outcome = classify(TargetKind::Host, CallKind::Action, Some(32), "", stderr);
        assert!(outcome.is_success());
        let outcome = classify(TargetKind::Host, CallKind::Compensation, Some(32), "", stderr);
        assert!(outcome.is_success());
    }

    #[test]
    fn already_done_does_not_apply_to_probes_or_other_targets() {
        let stderr = "umount: /mnt/data: not mounted.";
        assert!(!classify(TargetKind::Host, CallKind::Reconciliation, Some(32), "", stderr).is_success());
        assert!(!classify(TargetKind::ClusterApi, CallKind::Action, Some(1), "", stderr).is_success());
    }

    #[test]
    fn exit_zero_is_success_regardless_of_stderr() {
        let outcome = classify(TargetKind::ClusterApi, CallKind::Action, Some(0), "node/w1 cordoned", "Warning: deprecated");
        match outcome {
            Outcome::Success(output) => assert_eq!(output.stdout, "node/w1 cordoned"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn message_falls_back_to_exit_status() {
        let outcome = classify(TargetKind::Host, CallKind::Action, Some(3), "", "");
        assert_eq!(outcome.failure().unwrap().message, "exited with status 3");
        let outcome = classify(TargetKind::Host, CallKind::Action, None, "", "");
        assert_eq!(outcome.failure().unwrap().message, "terminated by signal");
    }
}
