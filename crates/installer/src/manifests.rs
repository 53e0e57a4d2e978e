//! Embedded manifest and chart-defaults templates.
//!
//! Templates live under `templates/` and are compiled into the binary. They
//! are rendered with handlebars with HTML escaping disabled. Values that come
//! from configuration are emitted through the `json` helper: a JSON string is
//! always a valid YAML scalar.

use std::path::Path;

use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised while rendering or writing a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("invalid template {name}: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to render {name}: {source}")]
    Render {
        name: &'static str,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Every template the installer renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    KindCluster,
    CalicoResources,
    CertManagerValues,
    ControllerValues,
    WorkerValues,
    UiValues,
    Project,
    ClusterRegistration,
    SliceConfig,
    IperfSleep,
    IperfServer,
    ServiceExport,
}

impl Template {
    pub const ALL: [Self; 12] = [
        Self::KindCluster,
        Self::CalicoResources,
        Self::CertManagerValues,
        Self::ControllerValues,
        Self::WorkerValues,
        Self::UiValues,
        Self::Project,
        Self::ClusterRegistration,
        Self::SliceConfig,
        Self::IperfSleep,
        Self::IperfServer,
        Self::ServiceExport,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::KindCluster => "kind-cluster",
            Self::CalicoResources => "calico-custom-resources",
            Self::CertManagerValues => "cert-manager-values",
            Self::ControllerValues => "controller-values",
            Self::WorkerValues => "worker-values",
            Self::UiValues => "ui-values",
            Self::Project => "project",
            Self::ClusterRegistration => "cluster-registration",
            Self::SliceConfig => "slice-config",
            Self::IperfSleep => "iperf-sleep",
            Self::IperfServer => "iperf-server",
            Self::ServiceExport => "service-export",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::KindCluster => include_str!("../templates/kind-cluster.yaml"),
            Self::CalicoResources => include_str!("../templates/calico-custom-resources.yaml"),
            Self::CertManagerValues => include_str!("../templates/cert-manager-values.yaml"),
            Self::ControllerValues => include_str!("../templates/controller-values.yaml"),
            Self::WorkerValues => include_str!("../templates/worker-values.yaml"),
            Self::UiValues => include_str!("../templates/ui-values.yaml"),
            Self::Project => include_str!("../templates/project.yaml"),
            Self::ClusterRegistration => include_str!("../templates/cluster-registration.yaml"),
            Self::SliceConfig => include_str!("../templates/slice-config.yaml"),
            Self::IperfSleep => include_str!("../templates/iperf-sleep.yaml"),
            Self::IperfServer => include_str!("../templates/iperf-server.yaml"),
            Self::ServiceExport => include_str!("../templates/service-export.yaml"),
        }
    }
}

fn register_helpers(registry: &mut Handlebars<'static>) {
    handlebars_helper!(json: |obj: Value| {
        serde_json::to_string(&obj).unwrap_or_else(|_| "null".to_string())
    });

    registry.register_helper("json", Box::new(json));
}

/// Compiled template registry.
pub struct Manifests {
    registry: Handlebars<'static>,
}

impl Manifests {
    /// Compile every embedded template.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Template`] if a template does not parse.
    pub fn new() -> Result<Self, ManifestError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        register_helpers(&mut registry);

        for template in Template::ALL {
            registry
                .register_template_string(template.name(), template.source())
                .map_err(|e| ManifestError::Template {
                    name: template.name(),
                    source: Box::new(e),
                })?;
        }

        Ok(Self { registry })
    }

    /// Render a template with a serializable context.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Render`] if rendering fails.
    pub fn render<T: Serialize>(&self, template: Template, context: &T) -> Result<String, ManifestError> {
        self.registry
            .render(template.name(), context)
            .map_err(|e| ManifestError::Render {
                name: template.name(),
                source: Box::new(e),
            })
    }

    /// Render a template straight into a file, truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    pub fn write<T: Serialize>(
        &self,
        template: Template,
        context: &T,
        path: &Path,
    ) -> Result<(), ManifestError> {
        let text = self.render(template, context)?;
        std::fs::write(path, text).map_err(|source| ManifestError::Write {
            path: path.display().to_string(),
            source,
        })?;
        debug!(template = template.name(), path = %path.display(), "Wrote manifest");
        Ok(())
    }
}
