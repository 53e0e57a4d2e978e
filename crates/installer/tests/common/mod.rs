#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose, Engine as _};
use slice_installer::config::TimingConfig;
use slice_installer::{CommandOutput, CommandRunner, Invocation, RunnerError, TopologyConfig};

type Predicate = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;

enum Response {
    Stdout(String),
    Fail(String),
}

/// Test double that records every invocation and answers from canned responses.
///
/// The first matching response wins; anything unmatched succeeds with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    responses: Vec<(Predicate, Response)>,
    missing: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        predicate: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
        stdout: impl Into<String>,
    ) -> Self {
        self.responses
            .push((Box::new(predicate), Response::Stdout(stdout.into())));
        self
    }

    pub fn fail(
        mut self,
        predicate: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
        stderr: impl Into<String>,
    ) -> Self {
        self.responses
            .push((Box::new(predicate), Response::Fail(stderr.into())));
        self
    }

    pub fn without(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Answers for a mesh where every query reports healthy resources and the
    /// controller has issued complete secrets for `workers`.
    pub fn healthy_mesh(workers: &[&str]) -> Self {
        let mut listing = String::from("secret/default-token-x\nsecret/kubeslice-license-file\n");
        for worker in workers {
            listing.push_str(&format!("secret/kubeslice-rbac-worker-{worker}\n"));
        }

        Self::new()
            .respond(
                |inv| inv.args.iter().any(|a| a.contains("InternalIP")),
                "172.18.0.2",
            )
            .respond(|inv| inv.has_arg("--minify"), "https://10.0.0.1:6443")
            .respond(|inv| inv.has_arg("pods"), "pod-0 1/1 Running 0 1m\n")
            .respond(
                |inv| inv.has_arg("secret") && inv.has_arg("json"),
                bootstrap_secret_json(),
            )
            .respond(|inv| inv.has_arg("secrets"), listing)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded invocations in a compact, path-independent form.
    pub fn transcript(&self) -> Vec<String> {
        self.calls().iter().map(describe).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let response = self
            .responses
            .iter()
            .find(|(predicate, _)| predicate(invocation))
            .map(|(_, response)| response);

        match response {
            Some(Response::Stdout(text)) => Ok(CommandOutput::stdout(text.clone())),
            Some(Response::Fail(stderr)) => Err(RunnerError::Failed {
                command: invocation.to_string(),
                status: "exit status: 1".into(),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            None => Ok(CommandOutput::default()),
        }
    }

    fn locate(&self, program: &str) -> Result<PathBuf, RunnerError> {
        if self.missing.iter().any(|m| m == program) {
            return Err(RunnerError::NotFound {
                program: program.to_string(),
                reason: "not on PATH".into(),
            });
        }
        Ok(PathBuf::from(format!("/usr/local/bin/{program}")))
    }
}

fn short(arg: &str) -> String {
    if arg.starts_with('/') || arg.starts_with("https://") {
        Path::new(arg)
            .file_name()
            .map_or_else(|| arg.to_string(), |n| n.to_string_lossy().into_owned())
    } else {
        arg.to_string()
    }
}

/// `kind create ks-ctrl`, `helm upgrade cert-manager @ctx`,
/// `kubectl get pods -n ns @ctx`.
pub fn describe(inv: &Invocation) -> String {
    let args = &inv.args;
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default()
    };

    match inv.program.as_str() {
        "kind" => format!("kind {} {}", args[0], flag("--name")),
        "helm" if args[0] == "repo" => format!("helm repo {}", args[1]),
        "helm" => {
            let release = if args[0] == "upgrade" { &args[2] } else { &args[1] };
            format!("helm {} {release} @{}", args[0], flag("--kube-context"))
        }
        "kubectl" => {
            let rest: Vec<String> = args[4..]
                .iter()
                .take_while(|a| *a != "-o" && *a != "--no-headers")
                .map(|a| short(a))
                .collect();
            format!("kubectl {} @{}", rest.join(" "), flag("--context"))
        }
        other => format!("{other} {}", args.join(" ")),
    }
}

fn b64(s: &str) -> String {
    general_purpose::STANDARD.encode(s)
}

pub fn bootstrap_secret_json() -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "data": {
            "namespace": b64("kubeslice-demo"),
            "controllerEndpoint": b64("https://172.18.0.2:6443"),
            "ca.crt": b64("-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n"),
            "token": b64("eyJhbGciOiJSUzI1NiJ9.worker"),
        }
    })
    .to_string()
}

/// One controller and two workers on local kind clusters.
pub fn demo_topology(working_dir: &Path, profile: &str) -> TopologyConfig {
    let doc = format!(
        "profile: {profile}\nworking_dir: {}\ncontroller:\n  name: ks-ctrl\nworkers:\n  - name: ks-w-1\n  - name: ks-w-2\n",
        working_dir.display()
    );
    finish(&doc)
}

/// One controller and two workers on existing clusters.
pub fn existing_topology(working_dir: &Path) -> TopologyConfig {
    let doc = format!(
        "working_dir: {}
kubeconfig: /home/ops/.kube/config
controller:
  name: hub
  context: hub-ctx
workers:
  - name: east
    context: east-ctx
  - name: west
    context: west-ctx
",
        working_dir.display()
    );
    finish(&doc)
}

/// A controller with no workers yet.
pub fn controller_only_topology(working_dir: &Path) -> TopologyConfig {
    let doc = format!(
        "working_dir: {}\ncontroller:\n  name: hub\n  context: hub-ctx\n  kubeconfig: /tmp/kc\n",
        working_dir.display()
    );
    finish(&doc)
}

fn finish(doc: &str) -> TopologyConfig {
    let mut config: TopologyConfig = serde_yaml::from_str(doc).unwrap();
    config.apply_defaults();
    config.timing = TimingConfig::immediate();
    assert!(config.validate().is_empty(), "{:?}", config.validate());
    config
}
