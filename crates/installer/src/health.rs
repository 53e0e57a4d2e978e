//! Read-only cluster health checks.
//!
//! Three independent probes per cluster (nodes, pods per expected namespace,
//! expected deployments) roll up into one [`HealthStatus`]. Missing
//! resources are tolerated; query failures become unhealthy results with the
//! captured output as detail.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClusterDescriptor, ClusterRole};
use crate::runner::CommandRunner;
use crate::tools::Kubectl;

const CONTROLLER_NAMESPACES: [&str; 2] = ["kubeslice-controller", "cert-manager"];
const WORKER_NAMESPACES: [&str; 1] = ["kubeslice-system"];

const CONTROLLER_DEPLOYMENTS: [&str; 2] = ["kubeslice-controller-manager", "cert-manager"];
const WORKER_DEPLOYMENTS: [&str; 2] = ["kubeslice-operator", "kubeslice-dns"];

/// Namespaces searched for each expected deployment.
const COMPONENT_NAMESPACES: [&str; 3] = ["kubeslice-controller", "kubeslice-system", "cert-manager"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Unhealthy => write!(f, "Unhealthy"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub detail: String,
}

impl ComponentHealth {
    fn new(name: impl Into<String>, status: HealthStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// Pod counts for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceHealth {
    pub namespace: String,
    pub status: HealthStatus,
    pub running: usize,
    pub total: usize,
    pub detail: String,
}

/// Health of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub name: String,
    pub role: ClusterRole,
    pub nodes: ComponentHealth,
    pub pod_status: HealthStatus,
    pub pods: Vec<NamespaceHealth>,
    pub component_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub overall: HealthStatus,
}

/// Namespaces whose pods are expected for a role.
#[must_use]
pub fn expected_namespaces(role: ClusterRole) -> &'static [&'static str] {
    match role {
        ClusterRole::Controller => &CONTROLLER_NAMESPACES,
        ClusterRole::Worker => &WORKER_NAMESPACES,
    }
}

/// Deployments expected for a role.
#[must_use]
pub fn expected_deployments(role: ClusterRole) -> &'static [&'static str] {
    match role {
        ClusterRole::Controller => &CONTROLLER_DEPLOYMENTS,
        ClusterRole::Worker => &WORKER_DEPLOYMENTS,
    }
}

/// Classify `name status` lines from the node Ready query.
#[must_use]
pub fn classify_nodes(listing: &str) -> ComponentHealth {
    let mut total = 0usize;
    let mut ready = 0usize;
    for line in listing.lines().filter(|l| !l.trim().is_empty()) {
        total += 1;
        if line.split_whitespace().nth(1) == Some("True") {
            ready += 1;
        }
    }

    let status = if total > 0 && ready == total {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    ComponentHealth::new("nodes", status, format!("{ready}/{total} nodes ready"))
}

/// Classify `name phase` lines for one existing namespace.
#[must_use]
pub fn classify_namespace_pods(namespace: &str, listing: &str) -> NamespaceHealth {
    let mut total = 0usize;
    let mut running = 0usize;
    for line in listing.lines().filter(|l| !l.trim().is_empty()) {
        total += 1;
        if line.split_whitespace().nth(1) == Some("Running") {
            running += 1;
        }
    }

    let (status, detail) = if total == 0 {
        (HealthStatus::Healthy, "no pods expected".to_string())
    } else if running == total {
        (HealthStatus::Healthy, format!("{running}/{total} running"))
    } else {
        (HealthStatus::Unhealthy, format!("{running}/{total} running"))
    };
    NamespaceHealth {
        namespace: namespace.to_string(),
        status,
        running,
        total,
        detail,
    }
}

/// Classify a `ready/desired` replica pair.
#[must_use]
pub fn classify_replicas(name: &str, namespace: &str, replicas: &str) -> ComponentHealth {
    let (ready, desired) = replicas.trim().split_once('/').unwrap_or(("", replicas));
    let ready: u32 = ready.trim().parse().unwrap_or(0);
    let desired: u32 = desired.trim().parse().unwrap_or(0);

    let status = if desired > 0 && ready == desired {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    ComponentHealth::new(name, status, format!("{ready}/{desired} ready in {namespace}"))
}

/// Any Unhealthy namespace is Unhealthy; no pods at all is Unknown.
#[must_use]
pub fn rollup_pods(namespaces: &[NamespaceHealth]) -> HealthStatus {
    if namespaces.iter().any(|n| n.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if namespaces.iter().map(|n| n.total).sum::<usize>() == 0 {
        HealthStatus::Unknown
    } else {
        HealthStatus::Healthy
    }
}

/// All Healthy is Healthy, any Unhealthy is Unhealthy, otherwise Unknown.
#[must_use]
pub fn rollup(statuses: &[HealthStatus]) -> HealthStatus {
    if statuses.iter().all(|s| *s == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else if statuses.contains(&HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Unknown
    }
}

/// Runs the health probes through a [`CommandRunner`].
pub struct HealthChecker<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> HealthChecker<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Build a fresh health report for one cluster.
    #[must_use]
    pub fn check_cluster_health(
        &self,
        cluster: &ClusterDescriptor,
        role: ClusterRole,
    ) -> ClusterHealth {
        let kubectl = Kubectl::new(cluster);
        debug!(cluster = %cluster.name, role = %role, "Checking cluster health");

        let nodes = self.check_nodes(&kubectl);
        let pods: Vec<_> = expected_namespaces(role)
            .iter()
            .map(|ns| self.check_namespace(&kubectl, ns))
            .collect();
        let components: Vec<_> = expected_deployments(role)
            .iter()
            .map(|name| self.check_deployment(&kubectl, name))
            .collect();

        let pod_status = rollup_pods(&pods);
        let component_status =
            rollup(&components.iter().map(|c| c.status).collect::<Vec<_>>());
        let overall = rollup(&[nodes.status, pod_status, component_status]);

        ClusterHealth {
            name: cluster.name.clone(),
            role,
            nodes,
            pod_status,
            pods,
            component_status,
            components,
            overall,
        }
    }

    fn check_nodes(&self, kubectl: &Kubectl<'_>) -> ComponentHealth {
        match self.runner.run(&kubectl.node_ready_status()) {
            Ok(output) => classify_nodes(&output.stdout),
            Err(e) => ComponentHealth::new(
                "nodes",
                HealthStatus::Unhealthy,
                format!("node query failed: {}", e.captured_output().trim()),
            ),
        }
    }

    fn check_namespace(&self, kubectl: &Kubectl<'_>, namespace: &str) -> NamespaceHealth {
        if let Err(e) = self.runner.run(&kubectl.get_namespace(namespace)) {
            let output = e.captured_output();
            let (status, detail) = if output.contains("NotFound") {
                (
                    HealthStatus::Healthy,
                    "namespace not found, no pods expected".to_string(),
                )
            } else {
                (
                    HealthStatus::Unhealthy,
                    format!("namespace query failed: {}", output.trim()),
                )
            };
            return NamespaceHealth {
                namespace: namespace.to_string(),
                status,
                running: 0,
                total: 0,
                detail,
            };
        }

        match self.runner.run(&kubectl.get_pod_phases(namespace)) {
            Ok(output) => classify_namespace_pods(namespace, &output.stdout),
            Err(e) => NamespaceHealth {
                namespace: namespace.to_string(),
                status: HealthStatus::Unhealthy,
                running: 0,
                total: 0,
                detail: format!("pod query failed: {}", e.captured_output().trim()),
            },
        }
    }

    fn check_deployment(&self, kubectl: &Kubectl<'_>, name: &str) -> ComponentHealth {
        for namespace in COMPONENT_NAMESPACES {
            let query = kubectl.get_jsonpath(
                "deployment",
                name,
                namespace,
                "{.status.readyReplicas}/{.spec.replicas}",
            );
            if let Ok(output) = self.runner.run(&query) {
                return classify_replicas(name, namespace, &output.stdout);
            }
        }
        ComponentHealth::new(name, HealthStatus::Unknown, "deployment not found")
    }
}
