use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use slice_installer::{InstallOptions, StepSkipSet};

use super::{load_installer, DEFAULT_CONFIG};

/// Install the slice mesh
#[derive(Args)]
pub struct InstallCommand {
    /// Topology file (YAML or JSON)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Steps to skip: kind, calico, controller, worker-registration, worker, ui, demo
    #[arg(long, value_name = "STEPS", value_delimiter = ',')]
    skip: Vec<String>,

    /// Verify license issuance and install the enterprise UI
    #[arg(long)]
    enterprise: bool,
}

impl InstallCommand {
    pub async fn run(&self) -> Result<()> {
        let options = InstallOptions {
            skip: StepSkipSet::parse(&self.skip)?,
            enterprise: self.enterprise,
        };
        let mut installer = load_installer(&self.config)?;
        installer.install_topology(&options).await
    }
}
