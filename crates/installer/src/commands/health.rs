use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use slice_installer::report::{self, OutputFormat};

use super::{load_installer, DEFAULT_CONFIG};

/// Check cluster health
#[derive(Args)]
pub struct HealthCommand {
    /// Topology file (YAML or JSON)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Only check this cluster
    #[arg(long, value_name = "NAME")]
    cluster: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

impl HealthCommand {
    pub fn run(&self) -> Result<()> {
        let installer = load_installer(&self.config)?;
        let reports = match &self.cluster {
            Some(name) => vec![installer.check_cluster_health(name)?],
            None => installer.check_all_clusters_health(),
        };
        print!("{}", report::render(self.output, &reports)?);
        Ok(())
    }
}
