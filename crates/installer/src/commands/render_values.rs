use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use slice_installer::{ui, ClusterRole};

use super::{load_installer, DEFAULT_CONFIG};

/// Render a worker's chart values without installing it
#[derive(Args)]
pub struct RenderValuesCommand {
    /// Topology file (YAML or JSON)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Worker cluster name
    #[arg(long, value_name = "NAME")]
    worker: String,

    /// Values file to write
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
}

impl RenderValuesCommand {
    pub async fn run(&self) -> Result<()> {
        let mut installer = load_installer(&self.config)?;
        if !matches!(installer.config().cluster(&self.worker), Some((_, ClusterRole::Worker))) {
            bail!("No worker cluster named '{}' in the configuration", self.worker);
        }

        installer.discover_network()?;
        let secret = installer.fetch_bootstrap_secret(&self.worker).await?;
        let Some((worker, _)) = installer.config().cluster(&self.worker) else {
            bail!("No worker cluster named '{}' in the configuration", self.worker);
        };
        installer.render_worker_values(worker, &secret, &self.output)?;

        ui::print_success(&format!(
            "Wrote values for {} to {}",
            self.worker,
            self.output.display()
        ));
        Ok(())
    }
}
