use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{load_installer, DEFAULT_CONFIG};

/// Uninstall the slice mesh
#[derive(Args)]
pub struct UninstallCommand {
    /// Topology file (YAML or JSON)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

impl UninstallCommand {
    pub async fn run(&self) -> Result<()> {
        load_installer(&self.config)?.uninstall_topology().await
    }
}
