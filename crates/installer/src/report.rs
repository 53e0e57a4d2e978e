//! Health report rendering.

use std::fmt::Write as _;

use anyhow::Result;
use colored::Colorize;

use crate::health::{ClusterHealth, HealthStatus};

/// Output format for `health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Render reports in the requested format.
///
/// # Errors
///
/// Returns an error if JSON or YAML serialization fails.
pub fn render(format: OutputFormat, reports: &[ClusterHealth]) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => render_table(reports),
        OutputFormat::Json => serde_json::to_string_pretty(reports)?,
        OutputFormat::Yaml => serde_yaml::to_string(reports)?,
    })
}

fn colored_status(status: HealthStatus) -> String {
    let text = format!("{:<10}", status.to_string());
    match status {
        HealthStatus::Healthy => text.green().to_string(),
        HealthStatus::Unhealthy => text.red().to_string(),
        HealthStatus::Unknown => text.yellow().to_string(),
    }
}

/// Fixed-width text report, one block per cluster.
#[must_use]
pub fn render_table(reports: &[ClusterHealth]) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:<24} {:<11} {:<10} {:<10} {:<10} {:<10}",
        "CLUSTER", "ROLE", "NODES", "PODS", "COMPONENTS", "OVERALL"
    );
    for report in reports {
        let _ = writeln!(
            out,
            "{:<24} {:<11} {} {} {} {}",
            report.name,
            report.role.to_string(),
            colored_status(report.nodes.status),
            colored_status(report.pod_status),
            colored_status(report.component_status),
            colored_status(report.overall),
        );
    }

    for report in reports {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({})", report.name.bold(), report.role);
        let _ = writeln!(out, "  {:<32} {}  {}", "nodes", colored_status(report.nodes.status), report.nodes.detail);
        for ns in &report.pods {
            let _ = writeln!(
                out,
                "  {:<32} {}  {}",
                format!("pods/{}", ns.namespace),
                colored_status(ns.status),
                ns.detail
            );
        }
        for component in &report.components {
            let _ = writeln!(
                out,
                "  {:<32} {}  {}",
                format!("deployment/{}", component.name),
                colored_status(component.status),
                component.detail
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterRole;
    use crate::health::{ComponentHealth, NamespaceHealth};

    fn sample() -> ClusterHealth {
        ClusterHealth {
            name: "ks-ctrl".into(),
            role: ClusterRole::Controller,
            nodes: ComponentHealth {
                name: "nodes".into(),
                status: HealthStatus::Healthy,
                detail: "2/2 nodes ready".into(),
            },
            pod_status: HealthStatus::Healthy,
            pods: vec![NamespaceHealth {
                namespace: "kubeslice-controller".into(),
                status: HealthStatus::Healthy,
                running: 3,
                total: 3,
                detail: "3/3 running".into(),
            }],
            component_status: HealthStatus::Unknown,
            components: vec![ComponentHealth {
                name: "kubeslice-controller-manager".into(),
                status: HealthStatus::Unknown,
                detail: "deployment not found".into(),
            }],
            overall: HealthStatus::Unknown,
        }
    }

    #[test]
    fn test_json_output() {
        let text = render(OutputFormat::Json, &[sample()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["role"], "controller");
        assert_eq!(value[0]["overall"], "unknown");
        assert_eq!(value[0]["pods"][0]["running"], 3);
    }

    #[test]
    fn test_yaml_round_trips() {
        let text = render(OutputFormat::Yaml, &[sample()]).unwrap();
        let parsed: Vec<ClusterHealth> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, vec![sample()]);
    }

    #[test]
    fn test_table_lists_every_probe() {
        colored::control::set_override(false);
        let text = render_table(&[sample()]);
        assert!(text.starts_with("CLUSTER"));
        assert!(text.contains("pods/kubeslice-controller"));
        assert!(text.contains("deployment/kubeslice-controller-manager"));
        assert!(text.contains("deployment not found"));
    }
}
