//! Subprocess execution for the external cluster tools.
//!
//! Every interaction with `kind`, `kubectl`, `helm` and `docker` goes through
//! the [`CommandRunner`] trait so that the sequencer, the readiness verifier and
//! the secret handshake can be exercised in tests without real clusters.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Errors raised while launching or running an external tool.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The executable could not be found in the path table or on PATH.
    #[error("{program} not found: {reason}")]
    NotFound { program: String, reason: String },

    /// The process could not be spawned.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited non-zero.
    #[error("`{command}` exited with {status}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

impl RunnerError {
    /// Combined stdout and stderr of a failed command, if any was captured.
    #[must_use]
    pub fn captured_output(&self) -> String {
        match self {
            Self::Failed { stdout, stderr, .. } => format!("{stdout}{stderr}"),
            Self::NotFound { reason, .. } => reason.clone(),
            Self::Launch { source, .. } => source.to_string(),
        }
    }
}

/// Where the child's stdout and stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the console (cluster creation, chart installs).
    Inherit,
    /// Capture into buffers for parsing.
    Capture,
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name, resolved through the path table.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Output handling.
    pub output: OutputMode,
    /// Optional payload written to the child's stdin.
    pub stdin: Option<String>,
    /// Suppress the debug log line for this command.
    pub quiet: bool,
}

impl Invocation {
    /// Create a captured invocation.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            output: OutputMode::Capture,
            stdin: None,
            quiet: false,
        }
    }

    /// Stream output to the console instead of capturing it.
    #[must_use]
    pub fn inherit(mut self) -> Self {
        self.output = OutputMode::Inherit;
        self
    }

    /// Feed `payload` to the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Do not log the command line.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// True if any argument equals `needle`.
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Output captured from a successful command. Empty in inherit mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Build an output holding only stdout.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            stderr: String::new(),
        }
    }
}

/// Executes external commands. The only seam between the core and the host.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run an invocation to completion. Non-zero exit is an error; no retries.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the program cannot be launched or fails.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError>;

    /// Resolve an executable to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotFound`] if the program cannot be located.
    fn locate(&self, program: &str) -> Result<PathBuf, RunnerError>;
}

/// Runs commands on the host using `std::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Explicit executable locations, keyed by program name.
    paths: HashMap<String, PathBuf>,
}

impl SystemRunner {
    /// Create a runner with a path table. Programs missing from the table are
    /// looked up on PATH.
    #[must_use]
    pub fn new(paths: HashMap<String, PathBuf>) -> Self {
        Self { paths }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let program = self.locate(&invocation.program)?;
        if !invocation.quiet {
            debug!(command = %invocation, "Running");
        }

        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args);
        cmd.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        match invocation.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let launch_err = |source| RunnerError::Launch {
            command: invocation.to_string(),
            source,
        };
        let mut child = cmd.spawn().map_err(launch_err)?;

        if let Some(payload) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.as_bytes()).map_err(launch_err)?;
            }
        }

        let output = child.wait_with_output().map_err(launch_err)?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(RunnerError::Failed {
                command: invocation.to_string(),
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn locate(&self, program: &str) -> Result<PathBuf, RunnerError> {
        if let Some(path) = self.paths.get(program) {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(RunnerError::NotFound {
                program: program.to_string(),
                reason: format!("configured path {} does not exist", path.display()),
            });
        }

        which::which(program).map_err(|e| RunnerError::NotFound {
            program: program.to_string(),
            reason: e.to_string(),
        })
    }
}
