//! Installation pipeline steps and the skip set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Step identifiers accepted by `--skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipStep {
    Kind,
    Calico,
    Controller,
    WorkerRegistration,
    Worker,
    Ui,
    Demo,
}

impl SkipStep {
    pub const ALL: [Self; 7] = [
        Self::Kind,
        Self::Calico,
        Self::Controller,
        Self::WorkerRegistration,
        Self::Worker,
        Self::Ui,
        Self::Demo,
    ];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Calico => "calico",
            Self::Controller => "controller",
            Self::WorkerRegistration => "worker-registration",
            Self::Worker => "worker",
            Self::Ui => "ui",
            Self::Demo => "demo",
        }
    }
}

impl fmt::Display for SkipStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SkipStep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|step| step.id() == wanted)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown step: {s}. Supported: {}",
                    Self::ALL.map(Self::id).join(", ")
                )
            })
    }
}

/// Steps the operator asked to skip. Fixed before the pipeline starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSkipSet(BTreeSet<SkipStep>);

impl StepSkipSet {
    /// Parse identifiers such as `["kind", "calico"]`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown identifier.
    pub fn parse<I, S>(ids: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| id.as_ref().parse())
            .collect::<anyhow::Result<BTreeSet<_>>>()
            .map(Self)
    }

    #[must_use]
    pub fn contains(&self, step: SkipStep) -> bool {
        self.0.contains(&step)
    }
}

impl FromIterator<SkipStep> for StepSkipSet {
    fn from_iter<T: IntoIterator<Item = SkipStep>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    VerifyingPrerequisites,
    PreparingWorkingDirectory,
    CreatingClusters,
    InstallingCni,
    DiscoveringNetwork,
    AddingChartRepository,
    InstallingController,
    RegisteringWorkers,
    InstallingWorkers,
    InstallingUi,
    DeployingDemo,
}

impl InstallStep {
    pub const TOTAL_STEPS: u8 = 11;

    pub const ALL: [Self; 11] = [
        Self::VerifyingPrerequisites,
        Self::PreparingWorkingDirectory,
        Self::CreatingClusters,
        Self::InstallingCni,
        Self::DiscoveringNetwork,
        Self::AddingChartRepository,
        Self::InstallingController,
        Self::RegisteringWorkers,
        Self::InstallingWorkers,
        Self::InstallingUi,
        Self::DeployingDemo,
    ];

    /// Human-readable description of the step.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::VerifyingPrerequisites => "Verifying external executables",
            Self::PreparingWorkingDirectory => "Preparing working directory",
            Self::CreatingClusters => "Creating local kind clusters",
            Self::InstallingCni => "Installing Calico CNI",
            Self::DiscoveringNetwork => "Discovering cluster network addresses",
            Self::AddingChartRepository => "Adding chart repository",
            Self::InstallingController => "Installing controller",
            Self::RegisteringWorkers => "Registering worker clusters",
            Self::InstallingWorkers => "Installing workers",
            Self::InstallingUi => "Installing enterprise UI",
            Self::DeployingDemo => "Deploying demo workload",
        }
    }

    /// 1-based position in the pipeline.
    #[must_use]
    pub fn step_number(&self) -> u8 {
        match self {
            Self::VerifyingPrerequisites => 1,
            Self::PreparingWorkingDirectory => 2,
            Self::CreatingClusters => 3,
            Self::InstallingCni => 4,
            Self::DiscoveringNetwork => 5,
            Self::AddingChartRepository => 6,
            Self::InstallingController => 7,
            Self::RegisteringWorkers => 8,
            Self::InstallingWorkers => 9,
            Self::InstallingUi => 10,
            Self::DeployingDemo => 11,
        }
    }

    /// The `--skip` identifier that bypasses this step, if any.
    #[must_use]
    pub fn skip_id(&self) -> Option<SkipStep> {
        match self {
            Self::CreatingClusters => Some(SkipStep::Kind),
            Self::InstallingCni => Some(SkipStep::Calico),
            Self::InstallingController => Some(SkipStep::Controller),
            Self::RegisteringWorkers => Some(SkipStep::WorkerRegistration),
            Self::InstallingWorkers => Some(SkipStep::Worker),
            Self::InstallingUi => Some(SkipStep::Ui),
            Self::DeployingDemo => Some(SkipStep::Demo),
            Self::VerifyingPrerequisites
            | Self::PreparingWorkingDirectory
            | Self::DiscoveringNetwork
            | Self::AddingChartRepository => None,
        }
    }

    /// Steps that only run when a deployment profile is set.
    #[must_use]
    pub fn requires_profile(&self) -> bool {
        matches!(
            self,
            Self::CreatingClusters | Self::InstallingCni | Self::DeployingDemo
        )
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
