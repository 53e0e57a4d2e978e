//! Slice mesh installer CLI.
//!
//! Creates or reuses Kubernetes clusters, installs the controller and worker
//! charts, joins workers to the controller and reports cluster health.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use slice_installer::ui;

mod commands;

use commands::health::HealthCommand;
use commands::install::InstallCommand;
use commands::render_values::RenderValuesCommand;
use commands::uninstall::UninstallCommand;

/// slicectl - multi-cluster slice mesh installer.
#[derive(Parser)]
#[command(
    name = "slicectl",
    version,
    about = "Multi-cluster slice mesh installer",
    long_about = "Install a slice mesh across one controller and several worker clusters.\n\n\
                  With a demo profile the clusters are created locally with kind;\n\
                  without one, the clusters named in the topology file are used as-is."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the mesh on every cluster in the topology.
    Install(InstallCommand),

    /// Remove the mesh (or the local clusters for demo profiles).
    Uninstall(UninstallCommand),

    /// Report node, pod and component health per cluster.
    Health(HealthCommand),

    /// Fetch a worker's bootstrap secret and write its chart values.
    RenderValues(RenderValuesCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info,slice_installer=debug")
        } else {
            EnvFilter::new("warn,slice_installer=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Install(cmd) => cmd.run().await,
        Commands::Uninstall(cmd) => cmd.run().await,
        Commands::Health(cmd) => cmd.run(),
        Commands::RenderValues(cmd) => cmd.run().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
