pub mod health;
pub mod install;
pub mod render_values;
pub mod uninstall;

use std::path::Path;

use anyhow::{Context, Result};
use slice_installer::{Installer, SystemRunner, TopologyConfig};
use tracing::info;

/// Default topology file, relative to the working directory.
pub const DEFAULT_CONFIG: &str = "topology.yaml";

/// Load the topology and build an installer backed by real subprocesses.
pub fn load_installer(path: &Path) -> Result<Installer<SystemRunner>> {
    let config = TopologyConfig::load(path)
        .with_context(|| format!("Failed to load topology from {}", path.display()))?;
    info!(
        path = %path.display(),
        controller = %config.controller.name,
        workers = config.workers.len(),
        "Loaded topology"
    );
    let runner = SystemRunner::new(config.executables.clone());
    Installer::new(config, runner)
}
