//! Readiness verification.
//!
//! Every long-running install step is gated on a poll loop: query the cluster,
//! classify the raw text into a [`ReadinessOutcome`], and keep polling until it
//! is a success. In-progress results are polled indefinitely; failed results
//! are tolerated up to a failure budget so that transient image pulls or
//! restarts can recover.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use crate::config::{ClusterDescriptor, TimingConfig};
use crate::retry::{retry, Attempt, Backoff, RetryError, RetryPolicy};
use crate::runner::{CommandRunner, Invocation};
use crate::tools::Kubectl;
use crate::ui;

/// Secret the controller creates once its license has been issued.
pub const LICENSE_SECRET: &str = "kubeslice-license-file";

/// Substrings that mark a pod as failing.
const ERROR_MARKERS: [&str; 3] = ["Error", "ImagePullBackOff", "CrashLoopBackOff"];

/// Substring that marks a pod as finished; such pods are ignored.
const COMPLETED_MARKER: &str = "Completed";

/// Result of classifying one status listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Success,
    InProgress,
    Failed,
}

/// Errors returned by the verifier.
#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error(
        "{resource} on cluster {cluster} failed {failures} readiness checks; last output:\n{last_output}"
    )]
    FailureBudgetExhausted {
        resource: String,
        cluster: String,
        failures: u32,
        last_output: String,
    },

    #[error("readiness check for {resource} on cluster {cluster} aborted:\n{last_output}")]
    Aborted {
        resource: String,
        cluster: String,
        last_output: String,
    },
}

/// Classify a `kubectl get pods --no-headers` listing.
///
/// Any error marker fails the whole listing. Completed pods are ignored.
/// Every remaining line with a `ready/total` token contributes to the counts;
/// the listing is a success when all counted containers are ready.
#[must_use]
pub fn classify_pods(listing: &str) -> ReadinessOutcome {
    if listing
        .lines()
        .any(|line| ERROR_MARKERS.iter().any(|marker| line.contains(marker)))
    {
        return ReadinessOutcome::Failed;
    }

    let mut ready = 0u64;
    let mut total = 0u64;
    for line in listing.lines() {
        if line.contains(COMPLETED_MARKER) {
            continue;
        }
        if let Some((r, t)) = line.split_whitespace().find_map(ratio_token) {
            ready += r;
            total += t;
        }
    }

    if total > 0 && ready == total {
        ReadinessOutcome::Success
    } else {
        ReadinessOutcome::InProgress
    }
}

fn ratio_token(token: &str) -> Option<(u64, u64)> {
    let (ready, total) = token.split_once('/')?;
    Some((ready.parse().ok()?, total.parse().ok()?))
}

/// Classify a `kubectl get secrets -o name` listing for the license secret.
#[must_use]
pub fn classify_license(listing: &str) -> ReadinessOutcome {
    if listing
        .lines()
        .any(|line| ERROR_MARKERS.iter().any(|marker| line.contains(marker)))
    {
        return ReadinessOutcome::Failed;
    }

    let present = listing.lines().any(|line| {
        let name = line.trim();
        name == LICENSE_SECRET || name.strip_prefix("secret/") == Some(LICENSE_SECRET)
    });
    if present {
        ReadinessOutcome::Success
    } else {
        ReadinessOutcome::InProgress
    }
}

/// What to poll and how to judge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// All pods in a namespace are ready.
    Pods { namespace: String },
    /// The license secret exists in a namespace.
    LicenseSecret { namespace: String },
}

impl ReadinessProbe {
    #[must_use]
    pub fn pods(namespace: impl Into<String>) -> Self {
        Self::Pods {
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn license(namespace: impl Into<String>) -> Self {
        Self::LicenseSecret {
            namespace: namespace.into(),
        }
    }

    /// The status query for this probe.
    #[must_use]
    pub fn query(&self, cluster: &ClusterDescriptor) -> Invocation {
        let kubectl = Kubectl::new(cluster);
        match self {
            Self::Pods { namespace } => kubectl.get_pods(namespace),
            Self::LicenseSecret { namespace } => kubectl.list_names("secrets", namespace),
        }
    }

    /// The classification predicate for this probe.
    #[must_use]
    pub fn classify(&self, text: &str) -> ReadinessOutcome {
        match self {
            Self::Pods { .. } => classify_pods(text),
            Self::LicenseSecret { .. } => classify_license(text),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Pods { namespace } => format!("pods in {namespace}"),
            Self::LicenseSecret { namespace } => format!("license secret in {namespace}"),
        }
    }
}

/// Polls a probe until it succeeds or its failure budget is spent.
pub struct ReadinessVerifier<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    interval: Duration,
    failure_budget: u32,
}

impl<'a, R: CommandRunner + ?Sized> ReadinessVerifier<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, timing: &TimingConfig) -> Self {
        Self {
            runner,
            interval: timing.poll_interval(),
            failure_budget: timing.failure_budget,
        }
    }

    /// Block until `probe` reports success on `cluster`.
    ///
    /// The verifier gives up on the `failure_budget + 1`-th failed
    /// classification. In-progress results never count against the budget.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::FailureBudgetExhausted`] with the last raw output.
    pub async fn verify(
        &self,
        cluster: &ClusterDescriptor,
        probe: &ReadinessProbe,
    ) -> Result<(), ReadinessError> {
        let what = probe.describe();
        let started = Instant::now();
        let policy = RetryPolicy::new(
            self.failure_budget.saturating_add(1),
            Backoff::Fixed(self.interval),
        );

        info!(cluster = %cluster.name, probe = %what, "Verifying readiness");

        let result = retry(&policy, &what, |attempt| {
            let outcome = match self.runner.run(&probe.query(cluster)) {
                Ok(output) => {
                    let outcome = probe.classify(&output.stdout);
                    (outcome, output.stdout)
                }
                Err(e) => (ReadinessOutcome::Failed, e.captured_output()),
            };
            ui::print_wait(&cluster.name, &what, outcome.0, attempt, started.elapsed());
            async move {
                match outcome {
                    (ReadinessOutcome::Success, _) => Attempt::Done(()),
                    (ReadinessOutcome::InProgress, _) => Attempt::Pending,
                    (ReadinessOutcome::Failed, raw) => Attempt::Failed(raw),
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                ui::print_success(&format!("{what} ready on {}", cluster.name));
                Ok(())
            }
            Err(RetryError::Exhausted { failures, last }) => {
                Err(ReadinessError::FailureBudgetExhausted {
                    resource: what,
                    cluster: cluster.name.clone(),
                    failures,
                    last_output: last,
                })
            }
            Err(RetryError::Aborted(last)) => Err(ReadinessError::Aborted {
                resource: what,
                cluster: cluster.name.clone(),
                last_output: last,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, MockCommandRunner, RunnerError};

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor::new("ks-ctrl", "kind-ks-ctrl", "/tmp/kubeconfig.yaml")
    }

    #[test]
    fn test_all_ready_is_success() {
        let listing = "pod1 1/1 Running 0 1m\npod1 1/1 Running 0 1m\n";
        assert_eq!(classify_pods(listing), ReadinessOutcome::Success);
    }

    #[test]
    fn test_partial_ready_is_in_progress() {
        let listing = "controller-0 1/2 Running 0 1m\nwebhook-1 1/1 Running 0 1m\n";
        assert_eq!(classify_pods(listing), ReadinessOutcome::InProgress);
    }

    #[test]
    fn test_error_marker_anywhere_fails() {
        let listing = "a 1/1 Running 0 1m\nb 0/1 CrashLoopBackOff 4 3m\nc 1/1 Running 0 1m\n";
        assert_eq!(classify_pods(listing), ReadinessOutcome::Failed);
        assert_eq!(
            classify_pods("x 0/1 ImagePullBackOff 0 1m"),
            ReadinessOutcome::Failed
        );
        assert_eq!(classify_pods("x 0/1 Init:Error 0 1m"), ReadinessOutcome::Failed);
    }

    #[test]
    fn test_completed_pods_are_ignored() {
        let listing = "job-abc 0/1 Completed 0 5m\nweb 1/1 Running 0 5m\n";
        assert_eq!(classify_pods(listing), ReadinessOutcome::Success);
        assert_eq!(
            classify_pods("job-abc 0/1 Completed 0 5m\n"),
            ReadinessOutcome::InProgress
        );
    }

    #[test]
    fn test_empty_listing_in_progress() {
        assert_eq!(classify_pods(""), ReadinessOutcome::InProgress);
        assert_eq!(
            classify_pods("No resources found in calico-system namespace."),
            ReadinessOutcome::InProgress
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let listing = "pod1 1/1 Running 0 1m\npod2 0/1 Pending 0 1m\n";
        let first = classify_pods(listing);
        for _ in 0..10 {
            assert_eq!(classify_pods(listing), first);
        }
    }

    #[test]
    fn test_license_classification() {
        assert_eq!(
            classify_license("secret/default-token\nsecret/kubeslice-license-file\n"),
            ReadinessOutcome::Success
        );
        assert_eq!(
            classify_license("secret/default-token\n"),
            ReadinessOutcome::InProgress
        );
        assert_eq!(
            classify_license("secret/kubeslice-license-file-old\n"),
            ReadinessOutcome::InProgress
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_exhausts_budget_exactly() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(7)
            .returning(|_| Ok(CommandOutput::stdout("p 0/1 CrashLoopBackOff 3 1m")));

        let timing = TimingConfig::immediate();
        let verifier = ReadinessVerifier::new(&runner, &timing);
        let err = verifier
            .verify(&cluster(), &ReadinessProbe::pods("kubeslice-controller"))
            .await
            .unwrap_err();

        match err {
            ReadinessError::FailureBudgetExhausted {
                failures,
                last_output,
                ..
            } => {
                assert_eq!(failures, 7);
                assert!(last_output.contains("CrashLoopBackOff"));
            }
            other => panic!("expected budget exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_progress_then_success() {
        let mut runner = MockCommandRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .times(20)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::stdout("p 0/1 ContainerCreating 0 1s")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::stdout("p 1/1 Running 0 1m")));

        let timing = TimingConfig::immediate();
        let verifier = ReadinessVerifier::new(&runner, &timing);
        verifier
            .verify(&cluster(), &ReadinessProbe::pods("cert-manager"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let mut runner = MockCommandRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::stdout("p 0/1 ErrImagePull Error 1 1m")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::stdout("p 1/1 Running 0 1m")));

        let timing = TimingConfig::immediate();
        let verifier = ReadinessVerifier::new(&runner, &timing);
        assert!(verifier
            .verify(&cluster(), &ReadinessProbe::pods("kubeslice-system"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_query_failure_counts_as_failed() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(2).returning(|inv| {
            Err(RunnerError::Failed {
                command: inv.to_string(),
                status: "exit status: 1".into(),
                stdout: String::new(),
                stderr: "Unable to connect to the server".into(),
            })
        });

        let timing = TimingConfig {
            failure_budget: 1,
            ..TimingConfig::immediate()
        };
        let verifier = ReadinessVerifier::new(&runner, &timing);
        let err = verifier
            .verify(&cluster(), &ReadinessProbe::license("kubeslice-controller"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unable to connect"));
    }

    #[test]
    fn test_probe_queries() {
        let cluster = cluster();
        let pods = ReadinessProbe::pods("calico-system").query(&cluster);
        assert!(pods.has_arg("pods"));
        assert!(pods.has_arg("calico-system"));
        let license = ReadinessProbe::license("kubeslice-controller").query(&cluster);
        assert!(license.has_arg("secrets"));
    }
}
