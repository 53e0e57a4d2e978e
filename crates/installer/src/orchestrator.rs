//! Installer orchestration module.
//!
//! This module drives the ordered install pipeline across the controller and
//! worker clusters, coordinating:
//! - Local cluster provisioning and CNI install for demo profiles
//! - Chart installs gated on readiness verification
//! - The worker bootstrap secret handshake and values rendering
//! - The optional demo workload

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{ChartOverride, ClusterDescriptor, InstallProfile, TopologyConfig};
use crate::health::{ClusterHealth, HealthChecker};
use crate::manifests::{Manifests, Template};
use crate::readiness::{ReadinessProbe, ReadinessVerifier};
use crate::retry::{retry, Attempt, Backoff, RetryPolicy};
use crate::runner::{CommandOutput, CommandRunner, Invocation};
use crate::secrets::{BootstrapSecret, SecretHandshake};
use crate::steps::{InstallStep, StepSkipSet};
use crate::tools::{self, Helm, Kubectl, Release};
use crate::ui;
use crate::validator::PrerequisitesValidator;
use crate::values::render_values;

const TIGERA_OPERATOR_MANIFEST: &str =
    "https://raw.githubusercontent.com/projectcalico/calico/v3.26.1/manifests/tigera-operator.yaml";
const KIND_NODE_IMAGE: &str = "kindest/node:v1.29.2";

pub const CALICO_NAMESPACE: &str = "calico-system";
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";
pub const CONTROLLER_NAMESPACE: &str = "kubeslice-controller";
pub const WORKER_NAMESPACE: &str = "kubeslice-system";

const CERT_MANAGER_RELEASE: &str = "cert-manager";
const CONTROLLER_RELEASE: &str = "kubeslice-controller";
const WORKER_RELEASE: &str = "kubeslice-worker";
const UI_RELEASE: &str = "kubeslice-ui";

const DEMO_NAMESPACE: &str = "iperf";
const DEMO_SLICE: &str = "demo-slice";

/// Per-run switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Steps to bypass.
    pub skip: StepSkipSet,
    /// Verify license issuance and install the enterprise UI.
    pub enterprise: bool,
}

/// Generated demo manifests.
struct DemoFiles {
    slice_config: PathBuf,
    iperf_sleep: PathBuf,
    iperf_server: PathBuf,
    service_export: PathBuf,
}

/// Main installer struct that sequences every cluster action.
pub struct Installer<R: CommandRunner> {
    config: TopologyConfig,
    runner: R,
    manifests: Manifests,
}

impl<R: CommandRunner> Installer<R> {
    /// Create an installer for a validated topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded templates fail to compile.
    pub fn new(config: TopologyConfig, runner: R) -> Result<Self> {
        let manifests = Manifests::new().context("Failed to compile embedded templates")?;
        Ok(Self {
            config,
            runner,
            manifests,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the install pipeline from start to finish.
    ///
    /// Steps run in a fixed order. Each step checks the skip set once, before
    /// it starts. The first failing step stops the pipeline; nothing that
    /// already completed is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first step failure with the step name attached.
    pub async fn install_topology(&mut self, options: &InstallOptions) -> Result<()> {
        let started = Instant::now();
        ui::print_section("Installing Slice Mesh");
        if let Some(profile) = self.config.profile {
            ui::print_kv("Profile", &profile.to_string());
        }

        for step in InstallStep::ALL {
            ui::print_progress_step(step.step_number(), InstallStep::TOTAL_STEPS, step.description());

            if let Some(reason) = self.skip_reason(step, options) {
                info!(step = ?step, reason = %reason, "Skipping step");
                ui::print_skipped(&reason);
                continue;
            }

            info!(step = ?step, "Executing step");
            if let Err(e) = self.execute_step(step, options).await {
                error!(step = ?step, error = %e, "Installation failed");
                return Err(e.context(format!("Installation failed at step '{step}'")));
            }
        }

        self.print_success_summary(started.elapsed(), options);
        Ok(())
    }

    fn skip_reason(&self, step: InstallStep, options: &InstallOptions) -> Option<String> {
        if step.requires_profile() && self.config.profile.is_none() {
            return Some("no deployment profile, using existing clusters".to_string());
        }
        if step == InstallStep::InstallingUi && !options.enterprise {
            return Some("enterprise UI not requested".to_string());
        }
        if step == InstallStep::DeployingDemo && self.config.workers.is_empty() {
            return Some("no worker clusters to run the demo on".to_string());
        }
        step.skip_id()
            .filter(|id| options.skip.contains(*id))
            .map(|id| format!("skipped with --skip {id}"))
    }

    async fn execute_step(&mut self, step: InstallStep, options: &InstallOptions) -> Result<()> {
        match step {
            InstallStep::VerifyingPrerequisites => {
                PrerequisitesValidator::for_profile(self.config.profile).validate(&self.runner)
            }
            InstallStep::PreparingWorkingDirectory => self.prepare_working_directory(),
            InstallStep::CreatingClusters => self.create_clusters(),
            InstallStep::InstallingCni => self.install_cni().await,
            InstallStep::DiscoveringNetwork => self.discover_network(),
            InstallStep::AddingChartRepository => self.add_chart_repository(),
            InstallStep::InstallingController => self.install_controller(options.enterprise).await,
            InstallStep::RegisteringWorkers => self.register_workers(),
            InstallStep::InstallingWorkers => self.install_workers().await,
            InstallStep::InstallingUi => self.install_ui().await,
            InstallStep::DeployingDemo => self.deploy_demo().await,
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        Ok(self.runner.run(invocation)?)
    }

    fn verifier(&self) -> ReadinessVerifier<'_, R> {
        ReadinessVerifier::new(&self.runner, &self.config.timing)
    }

    // --- Local cluster steps ---

    fn prepare_working_directory(&self) -> Result<()> {
        let dir = &self.config.working_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create working directory {}", dir.display()))?;

        if self.config.profile.is_some() {
            let kubeconfig = self.config.local_kubeconfig();
            if !kubeconfig.exists() {
                std::fs::write(&kubeconfig, "").with_context(|| {
                    format!("Failed to create placeholder kubeconfig {}", kubeconfig.display())
                })?;
            }
        }

        ui::print_kv("Working directory", &dir.display().to_string());
        Ok(())
    }

    fn create_clusters(&self) -> Result<()> {
        for (index, cluster) in self.config.clusters().enumerate() {
            let config_file = self
                .config
                .working_file(&format!("{}-kind.yaml", cluster.name));
            self.manifests.write(
                Template::KindCluster,
                &json!({
                    "name": cluster.name,
                    "pod_subnet": format!("10.{}.0.0/16", 100 + index),
                    "service_subnet": format!("10.{}.0.0/16", 200 + index),
                    "node_image": KIND_NODE_IMAGE,
                }),
                &config_file,
            )?;

            ui::print_progress(&format!("Creating kind cluster {}", cluster.name));
            self.run(&tools::kind_create(
                &cluster.name,
                &config_file,
                &cluster.kubeconfig,
            ))
            .with_context(|| format!("Failed to create cluster {}", cluster.name))?;
        }
        Ok(())
    }

    async fn install_cni(&self) -> Result<()> {
        let resources = self.config.working_file("calico-custom-resources.yaml");
        self.manifests
            .write(Template::CalicoResources, &json!({}), &resources)?;

        let verifier = self.verifier();
        for cluster in self.config.clusters() {
            ui::print_progress(&format!("Installing Calico on {}", cluster.name));
            let kubectl = Kubectl::new(cluster);
            self.run(&kubectl.create_file(TIGERA_OPERATOR_MANIFEST))?;
            self.run(&kubectl.apply_file(&resources))?;
            verifier
                .verify(cluster, &ReadinessProbe::pods(CALICO_NAMESPACE))
                .await?;
        }
        Ok(())
    }

    // --- Network discovery ---

    /// Resolve node IP and control-plane address for every cluster.
    ///
    /// Local clusters expose their API server on the node IP so that other
    /// kind nodes can reach it; existing clusters use the kubeconfig's server.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or returns nothing.
    pub fn discover_network(&mut self) -> Result<()> {
        let local = self.config.profile.is_some();
        let mut discovered = Vec::new();

        for cluster in self.config.clusters() {
            let kubectl = Kubectl::new(cluster);
            let node_ip = self.run(&kubectl.node_internal_ip())?.stdout.trim().to_string();
            if node_ip.is_empty() {
                bail!("Cluster {} reported no node InternalIP", cluster.name);
            }

            let address = if local {
                format!("https://{node_ip}:6443")
            } else {
                let server = self.run(&kubectl.server_url())?.stdout.trim().to_string();
                if server.is_empty() {
                    bail!("Context {} has no API server URL", cluster.context);
                }
                server
            };

            info!(cluster = %cluster.name, node_ip = %node_ip, address = %address, "Discovered network");
            ui::print_kv(&cluster.name, &format!("node {node_ip}, API {address}"));
            discovered.push((node_ip, address));
        }

        for (cluster, (node_ip, address)) in self.config.clusters_mut().zip(discovered) {
            cluster.node_ip = Some(node_ip);
            cluster.control_plane_address = Some(address);
        }
        Ok(())
    }

    // --- Chart steps ---

    fn add_chart_repository(&self) -> Result<()> {
        let repo = &self.config.charts.repository;
        self.run(&tools::helm_repo_add(&repo.alias, &repo.url))?;
        self.run(&tools::helm_repo_update())?;
        ui::print_success(&format!("Chart repository {} ready", repo.alias));
        Ok(())
    }

    fn values_file(&self, cluster: &ClusterDescriptor, chart: &ChartOverride) -> PathBuf {
        self.config
            .working_file(&format!("{}-{}-values.yaml", cluster.name, chart.chart))
    }

    /// Render a chart's values from its defaults template and overrides.
    fn render_chart_values(
        &self,
        cluster: &ClusterDescriptor,
        chart: &ChartOverride,
        template: Template,
        context: &serde_json::Value,
    ) -> Result<PathBuf> {
        let defaults = self.manifests.render(template, context)?;
        let path = self.values_file(cluster, chart);
        render_values(&path, chart, &defaults)
            .with_context(|| format!("Failed to render values for {}", chart.chart))?;
        Ok(path)
    }

    fn helm_install(
        &self,
        cluster: &ClusterDescriptor,
        release: &str,
        chart: &ChartOverride,
        namespace: &str,
        values_file: &Path,
    ) -> Result<()> {
        ui::print_progress(&format!("Installing {} on {}", chart.chart, cluster.name));
        let release = Release {
            name: release,
            chart: format!("{}/{}", self.config.charts.repository.alias, chart.chart),
            namespace,
            version: chart.version.as_deref(),
            values_file,
        };
        self.run(&Helm::new(cluster).upgrade_install(&release))
            .with_context(|| format!("Failed to install {} on {}", chart.chart, cluster.name))?;
        Ok(())
    }

    async fn install_controller(&self, enterprise: bool) -> Result<()> {
        let controller = &self.config.controller;
        let charts = &self.config.charts;
        let verifier = self.verifier();
        let image_pull = &self.config.image_pull_secret;

        let values = self.render_chart_values(
            controller,
            &charts.cert_manager,
            Template::CertManagerValues,
            &json!({ "image_pull": image_pull }),
        )?;
        self.helm_install(
            controller,
            CERT_MANAGER_RELEASE,
            &charts.cert_manager,
            CERT_MANAGER_NAMESPACE,
            &values,
        )?;
        verifier
            .verify(controller, &ReadinessProbe::pods(CERT_MANAGER_NAMESPACE))
            .await?;

        let values = self.render_chart_values(
            controller,
            &charts.controller,
            Template::ControllerValues,
            &json!({
                "endpoint": controller.control_plane_address.as_deref().unwrap_or_default(),
                "image_pull": image_pull,
            }),
        )?;
        self.helm_install(
            controller,
            CONTROLLER_RELEASE,
            &charts.controller,
            CONTROLLER_NAMESPACE,
            &values,
        )?;
        verifier
            .verify(controller, &ReadinessProbe::pods(CONTROLLER_NAMESPACE))
            .await?;
        if enterprise {
            verifier
                .verify(controller, &ReadinessProbe::license(CONTROLLER_NAMESPACE))
                .await?;
        }

        let project = self
            .manifests
            .render(Template::Project, &json!({ "project": self.config.project }))?;
        let project_file = self.config.working_file("project.yaml");
        std::fs::write(&project_file, &project)
            .with_context(|| format!("Failed to write {}", project_file.display()))?;
        self.run(&Kubectl::new(controller).apply_stdin(&project))
            .context("Failed to create project")?;
        self.wait_for_project_namespace().await
    }

    /// The controller creates the project namespace asynchronously.
    async fn wait_for_project_namespace(&self) -> Result<()> {
        let controller = &self.config.controller;
        let namespace = self.config.project_namespace();
        let kubectl = Kubectl::new(controller);
        let policy = RetryPolicy::new(
            self.config.timing.failure_budget.saturating_add(1),
            Backoff::Fixed(self.config.timing.poll_interval()),
        );

        retry(&policy, "project-namespace", |_| {
            let outcome = match self.runner.run(&kubectl.get_namespace(&namespace)) {
                Ok(_) => Attempt::Done(()),
                Err(e) => Attempt::Failed(e.captured_output()),
            };
            async move { outcome }
        })
        .await
        .with_context(|| format!("Project namespace {namespace} never appeared"))?;

        ui::print_success(&format!("Project namespace {namespace} created"));
        Ok(())
    }

    fn register_workers(&self) -> Result<()> {
        let kubectl = Kubectl::new(&self.config.controller);
        let project_namespace = self.config.project_namespace();

        for worker in &self.config.workers {
            let file = self
                .config
                .working_file(&format!("{}-cluster.yaml", worker.name));
            self.manifests.write(
                Template::ClusterRegistration,
                &json!({
                    "name": worker.name,
                    "project_namespace": project_namespace,
                    "node_ip": worker.node_ip.as_deref().unwrap_or_default(),
                }),
                &file,
            )?;
            self.run(&kubectl.apply_file(&file))
                .with_context(|| format!("Failed to register worker {}", worker.name))?;
            ui::print_success(&format!("Registered worker {}", worker.name));
        }
        Ok(())
    }

    /// Fetch a worker's bootstrap secret from the controller cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or exhausts its retries.
    pub async fn fetch_bootstrap_secret(&self, worker: &str) -> Result<BootstrapSecret> {
        SecretHandshake::new(
            &self.runner,
            self.config.worker_secret_source,
            &self.config.timing,
        )
        .fetch_bootstrap_secret(
            worker,
            &self.config.controller,
            &self.config.project_namespace(),
        )
        .await
        .with_context(|| format!("Failed to fetch bootstrap secret for worker {worker}"))
    }

    /// Render a worker's chart values: the global worker chart override merged
    /// with the cluster's own overrides, over the defaults carrying the
    /// bootstrap secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the defaults fail to render or the file cannot be written.
    pub fn render_worker_values(
        &self,
        worker: &ClusterDescriptor,
        secret: &BootstrapSecret,
        output: &Path,
    ) -> Result<()> {
        let defaults = self.manifests.render(
            Template::WorkerValues,
            &json!({
                "secret": secret.chart_values(),
                "cluster": worker.name,
                "node_ip": worker.node_ip.as_deref().unwrap_or_default(),
                "endpoint": worker.control_plane_address.as_deref().unwrap_or_default(),
                "image_pull": self.config.image_pull_secret,
            }),
        )?;
        let chart = self.config.charts.worker.for_cluster(worker);
        render_values(output, &chart, &defaults)
            .with_context(|| format!("Failed to render worker values for {}", worker.name))?;
        Ok(())
    }

    async fn install_workers(&self) -> Result<()> {
        let verifier = self.verifier();
        let chart = &self.config.charts.worker;

        for worker in &self.config.workers {
            ui::print_progress(&format!("Joining worker {}", worker.name));
            let secret = self.fetch_bootstrap_secret(&worker.name).await?;

            let values = self.values_file(worker, chart);
            self.render_worker_values(worker, &secret, &values)?;

            self.helm_install(worker, WORKER_RELEASE, chart, WORKER_NAMESPACE, &values)?;
            verifier
                .verify(worker, &ReadinessProbe::pods(WORKER_NAMESPACE))
                .await?;
        }
        Ok(())
    }

    async fn install_ui(&self) -> Result<()> {
        let controller = &self.config.controller;
        let chart = &self.config.charts.ui;
        let values = self.render_chart_values(
            controller,
            chart,
            Template::UiValues,
            &json!({ "image_pull": self.config.image_pull_secret }),
        )?;
        self.helm_install(controller, UI_RELEASE, chart, CONTROLLER_NAMESPACE, &values)?;
        self.verifier()
            .verify(controller, &ReadinessProbe::pods(CONTROLLER_NAMESPACE))
            .await?;
        Ok(())
    }

    // --- Demo workload ---

    /// Worker running the iperf client and worker running the iperf server.
    fn demo_clusters(&self) -> Result<(&ClusterDescriptor, &ClusterDescriptor)> {
        let Some(sleep) = self.config.workers.first() else {
            bail!("The demo needs at least one worker cluster");
        };
        let server = self.config.workers.get(1).unwrap_or(sleep);
        Ok((sleep, server))
    }

    fn write_demo_manifests(&self) -> Result<DemoFiles> {
        let files = DemoFiles {
            slice_config: self.config.working_file("slice-config.yaml"),
            iperf_sleep: self.config.working_file("iperf-sleep.yaml"),
            iperf_server: self.config.working_file("iperf-server.yaml"),
            service_export: self.config.working_file("service-export.yaml"),
        };

        let workers: Vec<&str> = self.config.workers.iter().map(|w| w.name.as_str()).collect();
        let context = json!({
            "slice": DEMO_SLICE,
            "project_namespace": self.config.project_namespace(),
            "workers": workers,
            "demo_namespace": DEMO_NAMESPACE,
        });

        self.manifests
            .write(Template::SliceConfig, &context, &files.slice_config)?;
        self.manifests
            .write(Template::IperfSleep, &context, &files.iperf_sleep)?;
        self.manifests
            .write(Template::IperfServer, &context, &files.iperf_server)?;
        self.manifests
            .write(Template::ServiceExport, &context, &files.service_export)?;
        Ok(files)
    }

    async fn deploy_demo(&self) -> Result<()> {
        let Some(profile) = self.config.profile else {
            return Ok(());
        };
        let files = self.write_demo_manifests()?;

        match profile {
            InstallProfile::FullDemo => self.apply_demo(&files).await,
            InstallProfile::MinimalDemo => {
                self.print_manual_demo_steps(&files)?;
                Ok(())
            }
        }
    }

    async fn wait_for_propagation(&self, what: &str) {
        let delay = self.config.timing.propagation_delay();
        if delay > Duration::ZERO {
            ui::print_info(&format!(
                "Waiting {}s for the {what} to propagate...",
                delay.as_secs()
            ));
        }
        tokio::time::sleep(delay).await;
    }

    async fn apply_demo(&self, files: &DemoFiles) -> Result<()> {
        let controller = Kubectl::new(&self.config.controller);
        let (sleep_cluster, server_cluster) = self.demo_clusters()?;
        let sleep = Kubectl::new(sleep_cluster);
        let server = Kubectl::new(server_cluster);
        let verifier = self.verifier();

        self.run(&controller.apply_file(&files.slice_config))
            .context("Failed to apply slice config")?;
        self.wait_for_propagation("slice config").await;

        self.run(&sleep.apply_file(&files.iperf_sleep))?;
        self.run(&server.apply_file(&files.iperf_server))?;
        verifier
            .verify(sleep_cluster, &ReadinessProbe::pods(DEMO_NAMESPACE))
            .await?;
        verifier
            .verify(server_cluster, &ReadinessProbe::pods(DEMO_NAMESPACE))
            .await?;

        self.run(&server.apply_file(&files.service_export))
            .context("Failed to apply service export")?;
        self.wait_for_propagation("service export").await;

        self.run(&sleep.rollout_restart("iperf-sleep", DEMO_NAMESPACE))?;
        self.run(&server.rollout_restart("iperf-server", DEMO_NAMESPACE))?;

        ui::print_section("Verify the demo");
        ui::print_info("Run iperf across the slice:");
        ui::print_command(&iperf_check(sleep_cluster).to_string());
        Ok(())
    }

    fn print_manual_demo_steps(&self, files: &DemoFiles) -> Result<()> {
        let controller = Kubectl::new(&self.config.controller);
        let (sleep_cluster, server_cluster) = self.demo_clusters()?;
        let sleep = Kubectl::new(sleep_cluster);
        let server = Kubectl::new(server_cluster);

        ui::print_section("Demo manifests generated");
        ui::print_info("Apply the slice, then the workloads, then export the server:");
        for invocation in [
            controller.apply_file(&files.slice_config),
            sleep.apply_file(&files.iperf_sleep),
            server.apply_file(&files.iperf_server),
            server.apply_file(&files.service_export),
        ] {
            ui::print_command(&invocation.to_string());
        }
        ui::print_info("Then check connectivity:");
        ui::print_command(&iperf_check(sleep_cluster).to_string());
        Ok(())
    }

    fn print_success_summary(&self, elapsed: Duration, options: &InstallOptions) {
        ui::print_section("Installation Complete");
        ui::print_success(&format!(
            "Slice mesh is up on {} worker(s) in {}m {}s",
            self.config.workers.len(),
            elapsed.as_secs() / 60,
            elapsed.as_secs() % 60
        ));
        ui::print_kv("Controller", &self.config.controller.name);
        ui::print_kv(
            "Workers",
            &self
                .config
                .workers
                .iter()
                .map(|w| w.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        ui::print_kv("Project", &self.config.project_namespace());
        ui::print_kv("Generated files", &self.config.working_dir.display().to_string());

        println!();
        ui::print_info("Next steps:");
        let controller = Kubectl::new(&self.config.controller);
        let project_namespace = self.config.project_namespace();
        ui::print_command(
            &controller
                .command([
                    "get",
                    "clusters.controller.kubeslice.io",
                    "-n",
                    project_namespace.as_str(),
                ])
                .to_string(),
        );
        if options.enterprise {
            ui::print_command(
                &controller
                    .command(["get", "svc", "kubeslice-ui-proxy", "-n", CONTROLLER_NAMESPACE])
                    .to_string(),
            );
        }
    }

    // --- Uninstall ---

    /// Tear the mesh down.
    ///
    /// Local clusters are deleted outright. On existing clusters only the Helm
    /// releases are removed; applied manifests are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if executables are missing or a teardown command fails.
    pub async fn uninstall_topology(&self) -> Result<()> {
        ui::print_section("Uninstalling Slice Mesh");
        PrerequisitesValidator::for_profile(self.config.profile).validate(&self.runner)?;

        let controller = &self.config.controller;
        if let Err(e) = self.runner.run(&Kubectl::new(controller).use_context()) {
            warn!(context = %controller.context, error = %e, "Could not switch context");
            ui::print_warning(&format!("Could not switch to context {}", controller.context));
        }

        if self.config.profile.is_some() {
            for cluster in self.config.clusters() {
                ui::print_progress(&format!("Deleting kind cluster {}", cluster.name));
                self.run(&tools::kind_delete(&cluster.name, &cluster.kubeconfig))
                    .with_context(|| format!("Failed to delete cluster {}", cluster.name))?;
            }
        } else {
            for worker in &self.config.workers {
                self.uninstall_release(worker, WORKER_RELEASE, WORKER_NAMESPACE)?;
            }
            self.uninstall_release(controller, UI_RELEASE, CONTROLLER_NAMESPACE)?;
            self.uninstall_release(controller, CONTROLLER_RELEASE, CONTROLLER_NAMESPACE)?;
        }

        ui::print_success("Uninstall complete");
        Ok(())
    }

    fn uninstall_release(
        &self,
        cluster: &ClusterDescriptor,
        release: &str,
        namespace: &str,
    ) -> Result<()> {
        match self.runner.run(&Helm::new(cluster).uninstall(release, namespace)) {
            Ok(_) => {
                ui::print_success(&format!("Removed {release} from {}", cluster.name));
                Ok(())
            }
            Err(e) if e.captured_output().contains("not found") => {
                warn!(cluster = %cluster.name, release, "Release not installed");
                ui::print_warning(&format!("{release} is not installed on {}", cluster.name));
                Ok(())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to uninstall {release} from {}", cluster.name)),
        }
    }

    // --- Health ---

    /// Health of one configured cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if no cluster has that name.
    pub fn check_cluster_health(&self, name: &str) -> Result<ClusterHealth> {
        let Some((cluster, role)) = self.config.cluster(name) else {
            bail!("No cluster named '{name}' in the configuration");
        };
        Ok(HealthChecker::new(&self.runner).check_cluster_health(cluster, role))
    }

    /// Health of every configured cluster, controller first.
    #[must_use]
    pub fn check_all_clusters_health(&self) -> Vec<ClusterHealth> {
        let checker = HealthChecker::new(&self.runner);
        self.config
            .clusters()
            .filter_map(|cluster| self.config.cluster(&cluster.name))
            .map(|(cluster, role)| checker.check_cluster_health(cluster, role))
            .collect()
    }
}

/// iperf client run from the sleep pod against the exported server.
fn iperf_check(cluster: &ClusterDescriptor) -> Invocation {
    Kubectl::new(cluster).command([
        "exec",
        "-it",
        "deploy/iperf-sleep",
        "-c",
        "iperf",
        "-n",
        DEMO_NAMESPACE,
        "--",
        "iperf",
        "-c",
        "iperf-server.iperf.svc.slice.local",
        "-p",
        "5201",
        "-i",
        "1",
        "-b",
        "10Mb",
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockCommandRunner;
    use crate::steps::SkipStep;

    fn topology() -> TopologyConfig {
        let mut config: TopologyConfig = serde_yaml::from_str(
            r"
controller:
  name: hub
  context: hub-ctx
  kubeconfig: /tmp/kc
workers:
  - name: east
    context: east-ctx
    kubeconfig: /tmp/kc
",
        )
        .unwrap();
        config.apply_defaults();
        config
    }

    #[test]
    fn test_profile_steps_skipped_without_profile() {
        let installer = Installer::new(topology(), MockCommandRunner::new()).unwrap();
        let options = InstallOptions::default();
        assert!(installer
            .skip_reason(InstallStep::CreatingClusters, &options)
            .is_some());
        assert!(installer
            .skip_reason(InstallStep::DeployingDemo, &options)
            .is_some());
        assert!(installer
            .skip_reason(InstallStep::InstallingController, &options)
            .is_none());
    }

    #[test]
    fn test_demo_skipped_without_workers() {
        let mut config = topology();
        config.profile = Some(InstallProfile::MinimalDemo);
        config.workers.clear();
        let installer = Installer::new(config, MockCommandRunner::new()).unwrap();
        assert_eq!(
            installer
                .skip_reason(InstallStep::DeployingDemo, &InstallOptions::default())
                .as_deref(),
            Some("no worker clusters to run the demo on")
        );
    }

    #[test]
    fn test_ui_requires_enterprise_and_honours_skip() {
        let installer = Installer::new(topology(), MockCommandRunner::new()).unwrap();
        let mut options = InstallOptions {
            enterprise: true,
            ..InstallOptions::default()
        };
        assert!(installer.skip_reason(InstallStep::InstallingUi, &options).is_none());

        options.skip = [SkipStep::Ui].into_iter().collect();
        assert_eq!(
            installer
                .skip_reason(InstallStep::InstallingUi, &options)
                .as_deref(),
            Some("skipped with --skip ui")
        );
    }

    #[test]
    fn test_discover_network_uses_server_url_for_existing_clusters() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.args.iter().any(|a| a.contains("InternalIP")))
            .times(2)
            .returning(|_| Ok(CommandOutput::stdout("10.0.0.7\n")));
        runner
            .expect_run()
            .withf(|inv| inv.has_arg("--minify"))
            .times(2)
            .returning(|_| Ok(CommandOutput::stdout("https://api.example:6443")));

        let mut installer = Installer::new(topology(), runner).unwrap();
        installer.discover_network().unwrap();
        let east = &installer.config().workers[0];
        assert_eq!(east.node_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(
            east.control_plane_address.as_deref(),
            Some("https://api.example:6443")
        );
    }

    #[test]
    fn test_discover_network_rejects_empty_node_ip() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(CommandOutput::stdout("")));
        let mut installer = Installer::new(topology(), runner).unwrap();
        let err = installer.discover_network().unwrap_err();
        assert!(err.to_string().contains("no node InternalIP"));
    }

    #[test]
    fn test_render_worker_values_merges_cluster_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = topology();
        config
            .charts
            .worker
            .values
            .insert("x.y".into(), serde_yaml::Value::from(1));
        config
            .charts
            .worker
            .values
            .insert("z".into(), serde_yaml::Value::from(2));
        config.workers[0]
            .overrides
            .insert("x.y".into(), serde_yaml::Value::from(9));
        config.workers[0]
            .overrides
            .insert("w".into(), serde_yaml::Value::from(3));
        config.workers[0].node_ip = Some("10.0.0.9".into());

        let installer = Installer::new(config, MockCommandRunner::new()).unwrap();
        let secret = BootstrapSecret {
            namespace: "kubeslice-demo".into(),
            controller_endpoint: "https://hub:6443".into(),
            ca_cert: "ca".into(),
            token: "tok".into(),
        };
        let out = dir.path().join("east-values.yaml");
        installer
            .render_worker_values(&installer.config().workers[0], &secret, &out)
            .unwrap();

        let doc: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc["x"]["y"], serde_yaml::Value::from(9));
        assert_eq!(doc["z"], serde_yaml::Value::from(2));
        assert_eq!(doc["w"], serde_yaml::Value::from(3));
        assert_eq!(doc["cluster"]["nodeIp"], serde_yaml::Value::from("10.0.0.9"));
        assert_eq!(
            doc["controllerSecret"]["token"],
            serde_yaml::Value::from(secret.chart_values()["token"].clone())
        );
    }

    #[tokio::test]
    async fn test_uninstall_tolerates_missing_release() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_locate()
            .returning(|p| Ok(std::path::PathBuf::from(format!("/usr/bin/{p}"))));
        runner
            .expect_run()
            .withf(|inv| inv.has_arg("use-context"))
            .times(1)
            .returning(|_| Ok(CommandOutput::default()));
        runner
            .expect_run()
            .withf(|inv| inv.has_arg("uninstall"))
            .times(3)
            .returning(|inv| {
                if inv.has_arg(UI_RELEASE) {
                    Err(crate::runner::RunnerError::Failed {
                        command: inv.to_string(),
                        status: "exit status: 1".into(),
                        stdout: String::new(),
                        stderr: "Error: uninstall: Release not loaded: kubeslice-ui: release: not found".into(),
                    })
                } else {
                    Ok(CommandOutput::default())
                }
            });

        let installer = Installer::new(topology(), runner).unwrap();
        installer.uninstall_topology().await.unwrap();
    }

    #[test]
    fn test_unknown_cluster_health_is_an_error() {
        let installer = Installer::new(topology(), MockCommandRunner::new()).unwrap();
        assert!(installer.check_cluster_health("nowhere").is_err());
    }
}
