//! Typed command lines for `kubectl`, `helm`, `kind` and `docker`.
//!
//! These helpers only build [`Invocation`]s; they never execute anything.
//! Every cluster-scoped command carries the cluster's context and kubeconfig
//! so that several clusters can share one kubeconfig file.

use std::path::Path;

use crate::config::ClusterDescriptor;
use crate::runner::Invocation;

pub const KUBECTL: &str = "kubectl";
pub const HELM: &str = "helm";
pub const KIND: &str = "kind";
pub const DOCKER: &str = "docker";

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// `kubectl` bound to one cluster.
#[derive(Debug, Clone, Copy)]
pub struct Kubectl<'a> {
    cluster: &'a ClusterDescriptor,
}

impl<'a> Kubectl<'a> {
    #[must_use]
    pub fn new(cluster: &'a ClusterDescriptor) -> Self {
        Self { cluster }
    }

    /// Arbitrary subcommand against this cluster.
    #[must_use]
    pub fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![
            "--context".to_string(),
            self.cluster.context.clone(),
            "--kubeconfig".to_string(),
            path_arg(&self.cluster.kubeconfig),
        ];
        all.extend(args.into_iter().map(Into::into));
        Invocation::new(KUBECTL, all)
    }

    /// `kubectl apply -f <file>`.
    #[must_use]
    pub fn apply_file(&self, file: &Path) -> Invocation {
        self.command(["apply".to_string(), "-f".to_string(), path_arg(file)])
    }

    /// `kubectl create -f <source>` (used for CRD bundles too large to apply).
    #[must_use]
    pub fn create_file(&self, source: &str) -> Invocation {
        self.command(["create", "-f", source])
    }

    /// `kubectl apply -f -` with the manifest on stdin.
    #[must_use]
    pub fn apply_stdin(&self, manifest: &str) -> Invocation {
        self.command(["apply", "-f", "-"]).with_stdin(manifest)
    }

    /// Pods in a namespace, one line per pod, no header.
    #[must_use]
    pub fn get_pods(&self, namespace: &str) -> Invocation {
        self.command(["get", "pods", "-n", namespace, "--no-headers"])
            .quiet()
    }

    /// Pod name and phase per line.
    #[must_use]
    pub fn get_pod_phases(&self, namespace: &str) -> Invocation {
        self.command([
            "get",
            "pods",
            "-n",
            namespace,
            "--no-headers",
            "-o",
            "custom-columns=NAME:.metadata.name,PHASE:.status.phase",
        ])
        .quiet()
    }

    /// Resource names of a kind in a namespace (`secret/foo` per line).
    #[must_use]
    pub fn list_names(&self, kind: &str, namespace: &str) -> Invocation {
        self.command(["get", kind, "-n", namespace, "-o", "name"])
            .quiet()
    }

    /// A single resource as JSON.
    #[must_use]
    pub fn get_json(&self, kind: &str, name: &str, namespace: &str) -> Invocation {
        self.command(["get", kind, name, "-n", namespace, "-o", "json"])
            .quiet()
    }

    /// A jsonpath query against a single resource.
    #[must_use]
    pub fn get_jsonpath(&self, kind: &str, name: &str, namespace: &str, path: &str) -> Invocation {
        self.command([
            "get".to_string(),
            kind.to_string(),
            name.to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "-o".to_string(),
            format!("jsonpath={path}"),
        ])
        .quiet()
    }

    /// Node name and Ready condition status per line.
    #[must_use]
    pub fn node_ready_status(&self) -> Invocation {
        self.command([
            "get",
            "nodes",
            "-o",
            r#"jsonpath={range .items[*]}{.metadata.name}{" "}{.status.conditions[?(@.type=="Ready")].status}{"\n"}{end}"#,
        ])
        .quiet()
    }

    /// InternalIP of the first node.
    #[must_use]
    pub fn node_internal_ip(&self) -> Invocation {
        self.command([
            "get",
            "nodes",
            "-o",
            r#"jsonpath={.items[0].status.addresses[?(@.type=="InternalIP")].address}"#,
        ])
        .quiet()
    }

    /// API server URL of the current context.
    #[must_use]
    pub fn server_url(&self) -> Invocation {
        self.command([
            "config",
            "view",
            "--minify",
            "-o",
            "jsonpath={.clusters[0].cluster.server}",
        ])
        .quiet()
    }

    /// Whether a namespace exists (fails with NotFound otherwise).
    #[must_use]
    pub fn get_namespace(&self, namespace: &str) -> Invocation {
        self.command(["get", "namespace", namespace, "-o", "name"])
            .quiet()
    }

    /// `kubectl rollout restart deployment/<name>`.
    #[must_use]
    pub fn rollout_restart(&self, deployment: &str, namespace: &str) -> Invocation {
        self.command([
            "rollout".to_string(),
            "restart".to_string(),
            format!("deployment/{deployment}"),
            "-n".to_string(),
            namespace.to_string(),
        ])
    }

    /// `kubectl config use-context`.
    #[must_use]
    pub fn use_context(&self) -> Invocation {
        self.command(["config", "use-context", self.cluster.context.as_str()])
    }
}

/// A Helm release to install or upgrade.
#[derive(Debug, Clone)]
pub struct Release<'a> {
    pub name: &'a str,
    pub chart: String,
    pub namespace: &'a str,
    pub version: Option<&'a str>,
    pub values_file: &'a Path,
}

/// `helm` bound to one cluster.
#[derive(Debug, Clone, Copy)]
pub struct Helm<'a> {
    cluster: &'a ClusterDescriptor,
}

impl<'a> Helm<'a> {
    #[must_use]
    pub fn new(cluster: &'a ClusterDescriptor) -> Self {
        Self { cluster }
    }

    fn scoped(&self, mut args: Vec<String>) -> Invocation {
        args.extend([
            "--kube-context".to_string(),
            self.cluster.context.clone(),
            "--kubeconfig".to_string(),
            path_arg(&self.cluster.kubeconfig),
        ]);
        Invocation::new(HELM, args)
    }

    /// `helm upgrade --install` with a values file, streaming output.
    #[must_use]
    pub fn upgrade_install(&self, release: &Release<'_>) -> Invocation {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.name.to_string(),
            release.chart.clone(),
            "--namespace".to_string(),
            release.namespace.to_string(),
            "--create-namespace".to_string(),
            "-f".to_string(),
            path_arg(release.values_file),
        ];
        if let Some(version) = release.version {
            args.extend(["--version".to_string(), version.to_string()]);
        }
        self.scoped(args).inherit()
    }

    /// `helm uninstall`, captured so a missing release can be recognised.
    #[must_use]
    pub fn uninstall(&self, release: &str, namespace: &str) -> Invocation {
        self.scoped(vec![
            "uninstall".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ])
    }
}

/// `helm repo add`. Not cluster scoped.
#[must_use]
pub fn helm_repo_add(alias: &str, url: &str) -> Invocation {
    Invocation::new(HELM, ["repo", "add", alias, url, "--force-update"])
}

/// `helm repo update`. Not cluster scoped.
#[must_use]
pub fn helm_repo_update() -> Invocation {
    Invocation::new(HELM, ["repo", "update"])
}

/// `kind create cluster` writing credentials into `kubeconfig`.
#[must_use]
pub fn kind_create(name: &str, config_file: &Path, kubeconfig: &Path) -> Invocation {
    Invocation::new(
        KIND,
        [
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--config".to_string(),
            path_arg(config_file),
            "--kubeconfig".to_string(),
            path_arg(kubeconfig),
        ],
    )
    .inherit()
}

/// `kind delete cluster`.
#[must_use]
pub fn kind_delete(name: &str, kubeconfig: &Path) -> Invocation {
    Invocation::new(
        KIND,
        [
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--kubeconfig".to_string(),
            path_arg(kubeconfig),
        ],
    )
    .inherit()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor::new("east", "kind-east", "/tmp/kubeconfig.yaml")
    }

    #[test]
    fn test_kubectl_scopes_context_and_kubeconfig() {
        let cluster = cluster();
        let inv = Kubectl::new(&cluster).get_pods("kubeslice-system");
        assert_eq!(
            inv.to_string(),
            "kubectl --context kind-east --kubeconfig /tmp/kubeconfig.yaml get pods -n kubeslice-system --no-headers"
        );
        assert!(inv.quiet);
    }

    #[test]
    fn test_helm_upgrade_install_with_version() {
        let cluster = cluster();
        let values = PathBuf::from("/work/east-worker-values.yaml");
        let release = Release {
            name: "kubeslice-worker",
            chart: "kubeslice/kubeslice-worker".into(),
            namespace: "kubeslice-system",
            version: Some("1.3.0"),
            values_file: &values,
        };
        let inv = Helm::new(&cluster).upgrade_install(&release);
        assert_eq!(inv.program, HELM);
        assert_eq!(&inv.args[..3], ["upgrade", "--install", "kubeslice-worker"]);
        assert!(inv.has_arg("-f"));
        assert!(inv.has_arg("/work/east-worker-values.yaml"));
        assert!(inv.has_arg("1.3.0"));
        assert!(inv.has_arg("--kube-context"));
    }

    #[test]
    fn test_helm_without_version() {
        let cluster = cluster();
        let values = PathBuf::from("v.yaml");
        let release = Release {
            name: "cert-manager",
            chart: "kubeslice/cert-manager".into(),
            namespace: "cert-manager",
            version: None,
            values_file: &values,
        };
        assert!(!Helm::new(&cluster).upgrade_install(&release).has_arg("--version"));
    }

    #[test]
    fn test_apply_stdin_carries_manifest() {
        let cluster = cluster();
        let inv = Kubectl::new(&cluster).apply_stdin("kind: Namespace\n");
        assert_eq!(inv.stdin.as_deref(), Some("kind: Namespace\n"));
        assert!(inv.has_arg("-"));
    }
}
