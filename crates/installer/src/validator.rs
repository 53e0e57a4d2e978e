use anyhow::Result;
use colored::Colorize;

use crate::config::InstallProfile;
use crate::runner::CommandRunner;
use crate::tools::{DOCKER, HELM, KIND, KUBECTL};
use crate::ui;

/// Verifies that the external tools the pipeline shells out to are present.
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

struct Requirement {
    program: &'static str,
    install_instructions: &'static str,
}

impl PrerequisitesValidator {
    /// Tools needed for a run with the given profile. Local clusters also
    /// need `kind` and `docker`.
    #[must_use]
    pub fn for_profile(profile: Option<InstallProfile>) -> Self {
        let mut requirements = vec![
            Requirement {
                program: KUBECTL,
                install_instructions: "Install kubectl from https://kubernetes.io/docs/tasks/tools/",
            },
            Requirement {
                program: HELM,
                install_instructions: "Install Helm from https://helm.sh/docs/intro/install/",
            },
        ];

        if profile.is_some() {
            requirements.push(Requirement {
                program: KIND,
                install_instructions:
                    "Install kind from https://kind.sigs.k8s.io/docs/user/quick-start/#installation",
            });
            requirements.push(Requirement {
                program: DOCKER,
                install_instructions: "Install Docker from https://docker.com",
            });
        }

        Self { requirements }
    }

    /// Program names checked by this validator, in order.
    #[must_use]
    pub fn programs(&self) -> Vec<&'static str> {
        self.requirements.iter().map(|r| r.program).collect()
    }

    /// Resolve every required program through the runner.
    ///
    /// # Errors
    ///
    /// Returns an error naming every missing program.
    pub fn validate<R: CommandRunner + ?Sized>(&self, runner: &R) -> Result<()> {
        let mut missing = Vec::new();

        for requirement in &self.requirements {
            match runner.locate(requirement.program) {
                Ok(path) => {
                    ui::print_check_result(
                        requirement.program,
                        true,
                        Some(&path.display().to_string()),
                    );
                }
                Err(_) => {
                    ui::print_check_result(requirement.program, false, None);
                    missing.push(requirement);
                }
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        println!();
        for requirement in &missing {
            println!(
                "  {} {} - {}",
                "✗".red(),
                requirement.program.red(),
                requirement.install_instructions.bright_black()
            );
        }
        println!();

        Err(anyhow::anyhow!(
            "Required executables not found: {}",
            missing
                .iter()
                .map(|r| r.program)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}
