//! Common error types for the Uyuni health check components.

use std::fmt;

/// A specialized Result type for health check operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for health check operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A tool needed to build, run or transfer artifacts is not installed.
    #[error("{tool} is required{}", .location.as_ref().map(|host| format!(" on {host}")).unwrap_or_default())]
    InfrastructureMissing {
        tool: String,
        location: Option<String>,
    },

    /// The target host lacks something the deployment relies on.
    #[error("{0}")]
    ConfigurationMissing(String),

    /// A command ran but did not succeed.
    #[error("Command `{command}` failed{}: {stderr}", .code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to build {artifact} image")]
    BuildFailed { artifact: String },

    #[error("Download error: {0}")]
    Download(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new infrastructure-missing error for a local tool.
    pub fn missing_tool(tool: impl fmt::Display) -> Self {
        Error::InfrastructureMissing {
            tool: tool.to_string(),
            location: None,
        }
    }

    /// Create a new infrastructure-missing error for a tool on a remote host.
    pub fn missing_tool_on(tool: impl fmt::Display, host: impl fmt::Display) -> Self {
        Error::InfrastructureMissing {
            tool: tool.to_string(),
            location: Some(host.to_string()),
        }
    }

    /// Create a new configuration-missing error.
    pub fn configuration_missing(msg: impl fmt::Display) -> Self {
        Error::ConfigurationMissing(msg.to_string())
    }

    /// Create a new command failure.
    pub fn command_failed(
        command: impl fmt::Display,
        code: Option<i32>,
        stderr: impl fmt::Display,
    ) -> Self {
        Error::CommandFailed {
            command: command.to_string(),
            code,
            stderr: stderr.to_string().trim().to_string(),
        }
    }

    /// Create a new build failure.
    pub fn build_failed(artifact: impl fmt::Display) -> Self {
        Error::BuildFailed {
            artifact: artifact.to_string(),
        }
    }

    /// Create a new download error.
    pub fn download(msg: impl fmt::Display) -> Self {
        Error::Download(msg.to_string())
    }

    /// Create a new network error.
    pub fn network(msg: impl fmt::Display) -> Self {
        Error::Network(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether this error came from reaching a network service.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Whether a required tool is missing.
    pub fn is_infrastructure_missing(&self) -> bool {
        matches!(self, Error::InfrastructureMissing { .. })
    }
}
