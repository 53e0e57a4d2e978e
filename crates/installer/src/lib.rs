//! Slice mesh installer library.
//!
//! Bootstraps a multi-cluster slice mesh across one controller and any number
//! of worker clusters by sequencing `kind`, `kubectl` and `helm` invocations,
//! gating each step on readiness checks, exchanging worker bootstrap secrets
//! and rendering per-cluster chart values.
//!
//! # Example
//!
//! ```ignore
//! use slice_installer::{InstallOptions, Installer, SystemRunner, TopologyConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TopologyConfig::load("topology.yaml".as_ref())?;
//!     let runner = SystemRunner::new(config.executables.clone());
//!     let mut installer = Installer::new(config, runner)?;
//!     installer.install_topology(&InstallOptions::default()).await?;
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod health;
pub mod manifests;
pub mod orchestrator;
pub mod readiness;
pub mod report;
pub mod retry;
pub mod runner;
pub mod secrets;
pub mod steps;
pub mod tools;
pub mod ui;
pub mod validator;
pub mod values;

// Re-export commonly used types at the crate root
pub use config::{ClusterDescriptor, ClusterRole, InstallProfile, TopologyConfig};
pub use health::{ClusterHealth, HealthStatus};
pub use orchestrator::{InstallOptions, Installer};
pub use readiness::ReadinessOutcome;
pub use runner::{CommandOutput, CommandRunner, Invocation, RunnerError, SystemRunner};
pub use secrets::BootstrapSecret;
pub use steps::{InstallStep, SkipStep, StepSkipSet};
