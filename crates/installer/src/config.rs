//! Topology configuration types.
//!
//! The configuration document describes the controller and worker clusters,
//! the chart coordinates and overrides, and the timing knobs used by the
//! readiness verifier and the secret handshake. It is loaded once and passed
//! explicitly into the [`crate::orchestrator::Installer`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::values::OverrideMap;

/// Errors raised while loading the configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// One or more validation problems, reported together.
    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallProfile {
    /// Local kind clusters plus a fully applied iperf demo.
    FullDemo,
    /// Local kind clusters; demo manifests are generated but not applied.
    MinimalDemo,
}

impl std::fmt::Display for InstallProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullDemo => write!(f, "full-demo"),
            Self::MinimalDemo => write!(f, "minimal-demo"),
        }
    }
}

/// Role a cluster plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    Controller,
    Worker,
}

impl std::fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// One Kubernetes cluster taking part in the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    /// Unique cluster name.
    pub name: String,
    /// kubectl context used to reach the cluster.
    #[serde(default)]
    pub context: String,
    /// Kubeconfig holding the context.
    #[serde(default)]
    pub kubeconfig: PathBuf,
    /// Per-cluster chart overrides, dot-path keyed.
    #[serde(default)]
    pub overrides: OverrideMap,
    /// API server address, resolved during network discovery.
    #[serde(skip)]
    pub control_plane_address: Option<String>,
    /// Node InternalIP, resolved during network discovery.
    #[serde(skip)]
    pub node_ip: Option<String>,
}

impl ClusterDescriptor {
    /// Create a descriptor with no overrides.
    pub fn new(
        name: impl Into<String>,
        context: impl Into<String>,
        kubeconfig: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            kubeconfig: kubeconfig.into(),
            overrides: OverrideMap::new(),
            control_plane_address: None,
            node_ip: None,
        }
    }
}

/// Helm repository coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRepository {
    /// Local alias passed to `helm repo add`.
    pub alias: String,
    pub url: String,
}

impl Default for ChartRepository {
    fn default() -> Self {
        Self {
            alias: "kubeslice".into(),
            url: "https://kubeslice.github.io/kubeslice/".into(),
        }
    }
}

/// Desired values for one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOverride {
    /// Chart name inside the repository.
    pub chart: String,
    /// Pinned chart version. Latest when absent.
    #[serde(default)]
    pub version: Option<String>,
    /// Dot-path keyed values.
    #[serde(default)]
    pub values: OverrideMap,
}

impl ChartOverride {
    /// A chart reference with no overrides.
    pub fn named(chart: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            version: None,
            values: OverrideMap::new(),
        }
    }

    /// Derive a worker's chart override: the union of both key sets, with the
    /// cluster's values winning key-for-key.
    #[must_use]
    pub fn for_cluster(&self, cluster: &ClusterDescriptor) -> Self {
        Self {
            chart: self.chart.clone(),
            version: self.version.clone(),
            values: crate::values::merge_overrides(&self.values, &cluster.overrides),
        }
    }
}

/// Chart settings for every release the installer manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    pub repository: ChartRepository,
    pub cert_manager: ChartOverride,
    pub controller: ChartOverride,
    pub worker: ChartOverride,
    pub ui: ChartOverride,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            repository: ChartRepository::default(),
            cert_manager: ChartOverride::named("cert-manager"),
            controller: ChartOverride::named("kubeslice-controller"),
            worker: ChartOverride::named("kubeslice-worker"),
            ui: ChartOverride::named("kubeslice-ui"),
        }
    }
}

/// Registry credentials injected into every chart's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullSecret {
    pub registry: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

/// How the worker bootstrap secret is located on the controller cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerSecretSource {
    /// List secrets and match `rbac-worker-<name>`.
    #[default]
    Secret,
    /// List service accounts and match `worker-<name>`, then follow its token secret.
    ServiceAccount,
}

/// Poll, retry and propagation timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between readiness polls.
    pub poll_interval_secs: u64,
    /// Failed classifications tolerated before a readiness check is fatal.
    pub failure_budget: u32,
    /// Delay after applying slice and service-export manifests.
    pub propagation_delay_secs: u64,
    /// Bootstrap secret lookup attempts.
    pub secret_attempts: u32,
    /// First backoff between secret lookups; doubles each attempt.
    pub secret_initial_backoff_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            failure_budget: 6,
            propagation_delay_secs: 30,
            secret_attempts: 3,
            secret_initial_backoff_secs: 2,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    #[must_use]
    pub fn secret_initial_backoff(&self) -> Duration {
        Duration::from_secs(self.secret_initial_backoff_secs)
    }

    /// Zero delays, for tests and dry environments.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            poll_interval_secs: 0,
            propagation_delay_secs: 0,
            secret_initial_backoff_secs: 0,
            ..Self::default()
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("kubeslice")
}

fn default_project() -> String {
    "demo".into()
}

/// Full topology configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Deployment profile; `None` means bring-your-own clusters.
    #[serde(default)]
    pub profile: Option<InstallProfile>,
    /// Project created on the controller.
    #[serde(default = "default_project")]
    pub project: String,
    /// Directory for generated manifests and values files.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Kubeconfig used by clusters that do not name their own.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    pub controller: ClusterDescriptor,
    #[serde(default)]
    pub workers: Vec<ClusterDescriptor>,
    #[serde(default)]
    pub charts: ChartsConfig,
    #[serde(default)]
    pub image_pull_secret: Option<ImagePullSecret>,
    #[serde(default)]
    pub worker_secret_source: WorkerSecretSource,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Explicit executable locations (`kubectl`, `helm`, `kind`, `docker`).
    #[serde(default)]
    pub executables: HashMap<String, PathBuf>,
}

impl TopologyConfig {
    /// Load, default and validate a configuration file (YAML or JSON).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_defaults();

        let problems = config.validate();
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }
        Ok(config)
    }

    /// Fill in contexts and kubeconfigs the document left empty.
    ///
    /// Local clusters are reached through `kind-<name>` contexts stored in the
    /// placeholder kubeconfig inside the working directory.
    pub fn apply_defaults(&mut self) {
        let profile = self.profile;
        let local_kubeconfig = self.local_kubeconfig();
        let shared = self.kubeconfig.clone();

        for cluster in std::iter::once(&mut self.controller).chain(self.workers.iter_mut()) {
            if profile.is_some() {
                if cluster.context.is_empty() {
                    cluster.context = format!("kind-{}", cluster.name);
                }
                if cluster.kubeconfig.as_os_str().is_empty() {
                    cluster.kubeconfig.clone_from(&local_kubeconfig);
                }
            } else if cluster.kubeconfig.as_os_str().is_empty() {
                if let Some(shared) = &shared {
                    cluster.kubeconfig.clone_from(shared);
                }
            }
        }
    }

    /// Check the document and collect every problem found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.project.trim().is_empty() {
            problems.push("project must not be empty".to_string());
        }

        let mut seen = BTreeSet::new();
        for cluster in self.clusters() {
            if cluster.name.trim().is_empty() {
                problems.push("every cluster needs a name".to_string());
                continue;
            }
            if !seen.insert(cluster.name.as_str()) {
                problems.push(format!("duplicate cluster name '{}'", cluster.name));
            }
            if self.profile.is_none() {
                if cluster.context.is_empty() {
                    problems.push(format!("cluster '{}' has no context", cluster.name));
                }
                if cluster.kubeconfig.as_os_str().is_empty() {
                    problems.push(format!("cluster '{}' has no kubeconfig", cluster.name));
                }
            }
        }

        if self.profile == Some(InstallProfile::FullDemo) && self.workers.len() < 2 {
            problems.push("the full-demo profile needs at least two workers".to_string());
        }

        for (label, chart) in [
            ("cert_manager", &self.charts.cert_manager),
            ("controller", &self.charts.controller),
            ("worker", &self.charts.worker),
            ("ui", &self.charts.ui),
        ] {
            if chart.chart.trim().is_empty() {
                problems.push(format!("charts.{label}.chart must not be empty"));
            }
        }

        if self.timing.secret_attempts == 0 {
            problems.push("timing.secret_attempts must be at least 1".to_string());
        }

        problems
    }

    /// Controller first, then workers in configuration order.
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterDescriptor> {
        std::iter::once(&self.controller).chain(self.workers.iter())
    }

    /// Mutable view of [`Self::clusters`], used once by network discovery.
    pub(crate) fn clusters_mut(&mut self) -> impl Iterator<Item = &mut ClusterDescriptor> {
        std::iter::once(&mut self.controller).chain(self.workers.iter_mut())
    }

    /// Look up a cluster and its role by name.
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<(&ClusterDescriptor, ClusterRole)> {
        if self.controller.name == name {
            return Some((&self.controller, ClusterRole::Controller));
        }
        self.workers
            .iter()
            .find(|w| w.name == name)
            .map(|w| (w, ClusterRole::Worker))
    }

    /// Namespace the controller creates for the project.
    #[must_use]
    pub fn project_namespace(&self) -> String {
        format!("kubeslice-{}", self.project)
    }

    /// Placeholder kubeconfig that kind writes local cluster credentials into.
    #[must_use]
    pub fn local_kubeconfig(&self) -> PathBuf {
        self.working_dir.join("kubeconfig.yaml")
    }

    /// Path of a generated file inside the working directory.
    #[must_use]
    pub fn working_file(&self, name: &str) -> PathBuf {
        self.working_dir.join(name)
    }
}
