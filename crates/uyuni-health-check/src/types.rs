//! Types shared by the orchestration stages.

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the orchestration runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeploymentTarget {
    /// The invoking host
    #[default]
    Local,
    /// A host reachable over ssh
    Remote(String),
}

impl DeploymentTarget {
    /// Build a target from an optional host name
    pub fn from_host(host: Option<String>) -> Self {
        match host {
            Some(host) if !host.trim().is_empty() => DeploymentTarget::Remote(host.trim().to_string()),
            _ => DeploymentTarget::Local,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            DeploymentTarget::Local => None,
            DeploymentTarget::Remote(host) => Some(host),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DeploymentTarget::Remote(_))
    }

    /// Host name to scrape the exporter on
    pub fn metrics_host(&self) -> &str {
        self.host().unwrap_or("localhost")
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentTarget::Local => write!(f, "local host"),
            DeploymentTarget::Remote(host) => write!(f, "{}", host),
        }
    }
}

/// Outcome of one command execution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    /// Exit code, -1 when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into a command failure
    pub fn into_success(self, argv: &[String]) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::command_failed(
                argv.join(" "),
                Some(self.exit_code),
                &self.stderr,
            ))
        }
    }
}

/// A host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl BindMount {
    pub fn new(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// How a deployed artifact is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Account the container runs as; must exist on the target
    pub service_account: String,
    pub mounts: Vec<BindMount>,
    pub network: Option<String>,
    pub restart: Option<String>,
    /// Remove the container once it exits
    pub remove_on_exit: bool,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            service_account: "salt".to_string(),
            mounts: vec![
                BindMount::new("/etc/salt", "/etc/salt", true),
                BindMount::new("/var/cache/salt/", "/var/cache/salt", false),
            ],
            network: Some("host".to_string()),
            restart: None,
            remove_on_exit: true,
        }
    }
}

/// Binary release fetched into a build context before building
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// URL of the zip archive
    pub url: String,
    /// Archive member to extract
    pub member: String,
}

/// A container image to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Image name (and tag)
    pub name: String,
    /// Build context directory
    pub context_dir: PathBuf,
    pub release: Option<ReleaseAsset>,
}

/// Result of an `ensure_running` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// A new container was started
    Started { container_id: String },
    /// A container with that name was already running
    AlreadyRunning { container_id: String },
}
