//! Worker bootstrap secret handshake.
//!
//! Before a worker chart can be installed, the controller cluster must have
//! issued credentials for that worker in the project namespace. The handshake
//! finds the worker's secret by name marker, decodes its data fields and
//! retries with exponential backoff while any field is still empty.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ClusterDescriptor, TimingConfig, WorkerSecretSource};
use crate::retry::{retry, Attempt, Backoff, RetryError, RetryPolicy};
use crate::runner::{CommandRunner, RunnerError};
use crate::tools::Kubectl;

/// Data keys the controller writes into a worker secret.
const KEY_NAMESPACE: &str = "namespace";
const KEY_ENDPOINT: &str = "controllerEndpoint";
const KEY_CA_CERT: &str = "ca.crt";
const KEY_TOKEN: &str = "token";

/// Errors raised while fetching a bootstrap secret.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("no {kind} matching '{marker}' in namespace {namespace} on the controller cluster")]
    NoMatch {
        kind: String,
        marker: String,
        namespace: String,
    },

    #[error("controller query failed: {0}")]
    Query(#[from] RunnerError),

    #[error("malformed {resource}: {reason}")]
    Malformed { resource: String, reason: String },

    #[error("bootstrap secret for {worker} is incomplete (missing: {})", .missing.join(", "))]
    Incomplete {
        worker: String,
        missing: Vec<&'static str>,
    },

    #[error("bootstrap secret for {worker} not ready after {attempts} attempts: {last}")]
    RetriesExhausted {
        worker: String,
        attempts: u32,
        #[source]
        last: Box<HandshakeError>,
    },
}

/// Credentials a worker needs to reach the controller. Values are decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapSecret {
    pub namespace: String,
    pub controller_endpoint: String,
    pub ca_cert: String,
    pub token: String,
}

impl BootstrapSecret {
    /// Decode the `data` block of a Kubernetes secret. Absent keys stay empty.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Malformed`] if a value is not valid base64 text.
    pub fn from_secret_data(
        resource: &str,
        data: &serde_json::Map<String, Value>,
    ) -> Result<Self, HandshakeError> {
        let field = |key: &str| -> Result<String, HandshakeError> {
            let Some(encoded) = data.get(key).and_then(Value::as_str) else {
                return Ok(String::new());
            };
            let bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| HandshakeError::Malformed {
                    resource: resource.to_string(),
                    reason: format!("{key}: {e}"),
                })?;
            String::from_utf8(bytes).map_err(|e| HandshakeError::Malformed {
                resource: resource.to_string(),
                reason: format!("{key}: {e}"),
            })
        };

        Ok(Self {
            namespace: field(KEY_NAMESPACE)?,
            controller_endpoint: field(KEY_ENDPOINT)?,
            ca_cert: field(KEY_CA_CERT)?,
            token: field(KEY_TOKEN)?,
        })
    }

    /// Names of the required fields that are still empty.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            (KEY_NAMESPACE, &self.namespace),
            (KEY_ENDPOINT, &self.controller_endpoint),
            (KEY_CA_CERT, &self.ca_cert),
            (KEY_TOKEN, &self.token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Base64-encoded fields for the worker chart's `controllerSecret` block.
    ///
    /// The CA key is exposed as `ca_crt` because handlebars paths cannot
    /// contain dots; the template writes it back as `ca.crt`.
    #[must_use]
    pub fn chart_values(&self) -> BTreeMap<&'static str, String> {
        let encode = |s: &str| general_purpose::STANDARD.encode(s);
        BTreeMap::from([
            ("namespace", encode(&self.namespace)),
            ("endpoint", encode(&self.controller_endpoint)),
            ("ca_crt", encode(&self.ca_cert)),
            ("token", encode(&self.token)),
        ])
    }
}

/// Resource kind listed and name marker matched for a worker.
#[must_use]
pub fn lookup_target(source: WorkerSecretSource, worker: &str) -> (&'static str, String) {
    match source {
        WorkerSecretSource::Secret => ("secrets", format!("rbac-worker-{worker}")),
        WorkerSecretSource::ServiceAccount => ("serviceaccounts", format!("worker-{worker}")),
    }
}

/// First resource name in a `-o name` listing that contains `marker`.
///
/// Matching is by substring, so a worker whose name extends another worker's
/// name can be matched by the shorter marker. Listing order decides.
#[must_use]
pub fn select_resource(listing: &str, marker: &str) -> Option<String> {
    listing
        .lines()
        .map(str::trim)
        .map(|line| line.rsplit_once('/').map_or(line, |(_, name)| name))
        .find(|name| name.contains(marker))
        .map(str::to_string)
}

/// Fetches worker bootstrap secrets from the controller cluster.
pub struct SecretHandshake<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    source: WorkerSecretSource,
    policy: RetryPolicy,
}

impl<'a, R: CommandRunner + ?Sized> SecretHandshake<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, source: WorkerSecretSource, timing: &TimingConfig) -> Self {
        Self {
            runner,
            source,
            policy: RetryPolicy::new(
                timing.secret_attempts,
                Backoff::doubling(timing.secret_initial_backoff()),
            ),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch and decode the bootstrap secret for `worker`.
    ///
    /// Each attempt re-runs both lookup phases. Only an incomplete secret is
    /// retried; a missing resource or a failing query ends the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::RetriesExhausted`] once every attempt found an
    /// incomplete secret, or the first non-retryable error.
    pub async fn fetch_bootstrap_secret(
        &self,
        worker: &str,
        controller: &ClusterDescriptor,
        project_namespace: &str,
    ) -> Result<BootstrapSecret, HandshakeError> {
        info!(worker = %worker, namespace = %project_namespace, "Fetching bootstrap secret");

        let result = retry(&self.policy, "bootstrap-secret", |attempt| {
            let outcome = match self.lookup(worker, controller, project_namespace) {
                Ok(secret) if secret.is_complete() => Attempt::Done(secret),
                Ok(secret) => {
                    debug!(worker = %worker, attempt, missing = ?secret.missing_fields(), "Secret incomplete");
                    Attempt::Failed(HandshakeError::Incomplete {
                        worker: worker.to_string(),
                        missing: secret.missing_fields(),
                    })
                }
                Err(e) => Attempt::Fatal(e),
            };
            async move { outcome }
        })
        .await;

        match result {
            Ok(secret) => Ok(secret),
            Err(RetryError::Exhausted { failures, last }) => Err(HandshakeError::RetriesExhausted {
                worker: worker.to_string(),
                attempts: failures,
                last: Box::new(last),
            }),
            Err(RetryError::Aborted(e)) => Err(e),
        }
    }

    /// One pass of both phases. An empty token reference yields an empty secret.
    fn lookup(
        &self,
        worker: &str,
        controller: &ClusterDescriptor,
        namespace: &str,
    ) -> Result<BootstrapSecret, HandshakeError> {
        let kubectl = Kubectl::new(controller);
        let (kind, marker) = lookup_target(self.source, worker);

        let listing = self.runner.run(&kubectl.list_names(kind, namespace))?;
        let resource =
            select_resource(&listing.stdout, &marker).ok_or_else(|| HandshakeError::NoMatch {
                kind: kind.to_string(),
                marker: marker.clone(),
                namespace: namespace.to_string(),
            })?;

        let secret_name = match self.source {
            WorkerSecretSource::Secret => resource,
            WorkerSecretSource::ServiceAccount => {
                let token_ref = self.runner.run(&kubectl.get_jsonpath(
                    "serviceaccount",
                    &resource,
                    namespace,
                    "{.secrets[0].name}",
                ))?;
                let name = token_ref.stdout.trim().to_string();
                if name.is_empty() {
                    return Ok(BootstrapSecret::default());
                }
                name
            }
        };

        let raw = self
            .runner
            .run(&kubectl.get_json("secret", &secret_name, namespace))?;
        let document: Value =
            serde_json::from_str(&raw.stdout).map_err(|e| HandshakeError::Malformed {
                resource: format!("secret/{secret_name}"),
                reason: e.to_string(),
            })?;

        match document.get("data").and_then(Value::as_object) {
            Some(data) => BootstrapSecret::from_secret_data(&format!("secret/{secret_name}"), data),
            None => Ok(BootstrapSecret::default()),
        }
    }
}
