//! Configuration loading and validation for the health check

use crate::types::{ArtifactSpec, BindMount, DeploymentTarget, ReleaseAsset, RunSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Default exporter metrics port
pub const DEFAULT_EXPORTER_PORT: u16 = 9000;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub exporter: ExporterSettings,

    #[serde(default)]
    pub logcli: LogcliSettings,

    #[serde(default)]
    pub deploy: DeploySettings,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// File the configuration was read from, `None` for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.runtime.validate()?;
        self.exporter.validate()?;
        self.logcli.validate()?;
        self.deploy.validate()?;
        validate_mounts(&self.deploy.mounts)?;
        validate_restart_policy(&self.deploy)?;
        Ok(())
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RuntimeSettings {
    #[validate(length(min = 1))]
    pub program: String,
}

/// Exporter image settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExporterSettings {
    #[validate(length(min = 1))]
    pub image: String,

    pub context_dir: PathBuf,

    #[validate(range(min = 1))]
    pub port: u16,
}

/// logcli image settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LogcliSettings {
    #[validate(length(min = 1))]
    pub image: String,

    pub context_dir: PathBuf,

    #[validate(custom = "validate_http_url")]
    pub release_url: String,

    #[validate(length(min = 1))]
    pub release_member: String,
}

/// Deployment settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeploySettings {
    #[validate(custom = "validate_absolute_path")]
    pub archive_path: String,

    #[validate(custom = "validate_absolute_path")]
    pub remote_dir: String,

    #[validate(length(min = 1))]
    pub service_account: String,

    pub mounts: Vec<BindMount>,

    pub network: Option<String>,

    pub restart: Option<String>,

    pub remove_on_exit: bool,
}

/// Metrics fetch settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Request timeout; the HTTP client default applies when unset
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

// Default implementations

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            program: "podman".to_string(),
        }
    }
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            image: "uyuni-health-exporter".to_string(),
            context_dir: PathBuf::from("/usr/share/uyuni-health-check/exporter"),
            port: DEFAULT_EXPORTER_PORT,
        }
    }
}

impl Default for LogcliSettings {
    fn default() -> Self {
        Self {
            image: "logcli".to_string(),
            context_dir: PathBuf::from("/usr/share/uyuni-health-check/logcli"),
            release_url:
                "https://github.com/grafana/loki/releases/download/v2.5.0/logcli-linux-amd64.zip"
                    .to_string(),
            release_member: "logcli-linux-amd64".to_string(),
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        let spec = RunSpec::default();
        Self {
            archive_path: "/tmp/uyuni-health-exporter.tar".to_string(),
            remote_dir: "/tmp/".to_string(),
            service_account: spec.service_account,
            mounts: spec.mounts,
            network: spec.network,
            restart: spec.restart,
            remove_on_exit: spec.remove_on_exit,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "uyuni-health-check".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    let trimmed = url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ValidationError::new("url_not_http"));
    }
    Ok(())
}

fn validate_absolute_path(path: &str) -> Result<(), ValidationError> {
    if !path.trim().starts_with('/') {
        return Err(ValidationError::new("path_not_absolute"));
    }
    Ok(())
}

fn validate_mounts(mounts: &[BindMount]) -> Result<(), ValidationErrors> {
    for mount in mounts {
        if validate_absolute_path(&mount.source).is_err() || validate_absolute_path(&mount.target).is_err() {
            let mut errors = ValidationErrors::new();
            errors.add("mounts", ValidationError::new("mount_path_not_absolute"));
            return Err(errors);
        }
    }
    Ok(())
}

/// podman refuses `--rm` together with a restart policy other than `no`
fn validate_restart_policy(deploy: &DeploySettings) -> Result<(), ValidationErrors> {
    let restarts = deploy
        .restart
        .as_deref()
        .is_some_and(|policy| policy.trim() != "no");
    if deploy.remove_on_exit && restarts {
        let mut errors = ValidationErrors::new();
        errors.add("restart", ValidationError::new("restart_conflicts_with_remove_on_exit"));
        return Err(errors);
    }
    Ok(())
}

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub server: Option<String>,
    pub exporter_port: Option<u16>,
    pub loki: Option<String>,
    pub skip_build: bool,
}

/// Everything one orchestration run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: DeploymentTarget,
    /// Container runtime program
    pub runtime: String,
    /// Images to build, in order
    pub artifacts: Vec<ArtifactSpec>,
    /// Image (and container name) of the exporter
    pub exporter_image: String,
    pub exporter_port: u16,
    pub run_spec: RunSpec,
    pub archive_path: PathBuf,
    pub remote_dir: String,
    /// External log aggregation endpoint; skips the log pipeline deployment
    pub loki: Option<String>,
    pub fetch_timeout: Option<Duration>,
    pub skip_build: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Config::default().to_run_config(RunOverrides::default())
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from an explicit file or the default search paths.
    ///
    /// Runs before tracing is set up; the chosen file is kept in `source`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        config.source = Some(path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/uyuni-health-check/config.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./uyuni-health-check.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/uyuni-health-check/config.yaml"))
    }

    /// Convert to the configuration of one run
    pub fn to_run_config(&self, overrides: RunOverrides) -> RunConfig {
        RunConfig {
            target: DeploymentTarget::from_host(overrides.server),
            runtime: self.runtime.program.clone(),
            artifacts: vec![
                ArtifactSpec {
                    name: self.exporter.image.clone(),
                    context_dir: self.exporter.context_dir.clone(),
                    release: None,
                },
                ArtifactSpec {
                    name: self.logcli.image.clone(),
                    context_dir: self.logcli.context_dir.clone(),
                    release: Some(ReleaseAsset {
                        url: self.logcli.release_url.clone(),
                        member: self.logcli.release_member.clone(),
                    }),
                },
            ],
            exporter_image: self.exporter.image.clone(),
            exporter_port: overrides.exporter_port.unwrap_or(self.exporter.port),
            run_spec: RunSpec {
                service_account: self.deploy.service_account.clone(),
                mounts: self.deploy.mounts.clone(),
                network: self.deploy.network.clone(),
                restart: self.deploy.restart.clone(),
                remove_on_exit: self.deploy.remove_on_exit,
            },
            archive_path: PathBuf::from(&self.deploy.archive_path),
            remote_dir: self.deploy.remote_dir.clone(),
            loki: overrides.loki.filter(|url| !url.trim().is_empty()),
            fetch_timeout: self.fetch.timeout,
            skip_build: overrides.skip_build,
        }
    }
}
