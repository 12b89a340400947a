//! Uyuni health check
//!
//! Builds the health exporter image, deploys it on the Uyuni server (locally
//! or over ssh), scrapes its metrics and summarizes them as tables.
//!
//! # Components
//!
//! - **Executor**: runs commands locally or through ssh
//! - **Builder**: builds container images, provisioning release binaries first
//! - **Deployer**: idempotently starts the exporter container on the target
//! - **Orchestrator**: drives the stages of a run
//! - **Reporter**: turns a metrics snapshot into tables

pub mod builder;
pub mod config;
pub mod deployer;
pub mod executor;
pub mod orchestrator;
pub mod reporter;
pub mod telemetry;
pub mod types;

pub use builder::ArtifactBuilder;
pub use config::{Config, ConfigError, RunConfig, RunOverrides};
pub use deployer::Deployer;
pub use executor::{CommandRunner, ProcessRunner};
pub use orchestrator::{Event, HealthCheck, RunSummary, Stage, StageFailure};
pub use reporter::{Report, render};
pub use telemetry::{TelemetryGuard, setup_tracing};
pub use types::{ArtifactSpec, BindMount, CommandResult, DeployOutcome, DeploymentTarget, RunSpec};
