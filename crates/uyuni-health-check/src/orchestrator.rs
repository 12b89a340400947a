//! End-to-end health check run.
//!
//! A run walks through the stages in a fixed order, each gated on the
//! previous one:
//!
//! ```text
//! Idle -> Building -> DeployingExporter -> DeployingLogPipeline -> FetchingMetrics -> Rendering -> Done
//!   \__________\_______________\___________________\____________________\_________________/-> Failed
//! ```
//!
//! `DeployingLogPipeline` is passed over entirely when an external Loki
//! endpoint is configured.

use crate::builder::ArtifactBuilder;
use crate::config::RunConfig;
use crate::deployer::Deployer;
use crate::executor::CommandRunner;
use crate::reporter::{self, Report};
use crate::types::DeployOutcome;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument};
use uyuni_metrics::{MetricsSnapshot, MetricsSource};

/// Orchestration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Building,
    DeployingExporter,
    DeployingLogPipeline,
    FetchingMetrics,
    Rendering,
    Done,
    Failed,
}

impl Stage {
    /// Operator-facing heading announced when the stage starts
    pub fn heading(&self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Building => "Building containers",
            Stage::DeployingExporter => "Deploying the exporter",
            Stage::DeployingLogPipeline => "Deploying the log pipeline",
            Stage::FetchingMetrics => "Fetching metrics",
            Stage::Rendering => "Rendering results",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Building => "building",
            Stage::DeployingExporter => "deploying exporter",
            Stage::DeployingLogPipeline => "deploying log pipeline",
            Stage::FetchingMetrics => "fetching metrics",
            Stage::Rendering => "rendering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A run aborted in `stage`
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: common::Error,
}

impl StageFailure {
    /// Whether the process must exit with a failure status.
    ///
    /// Only a failed metrics fetch is; other failures are reported and the
    /// process exits normally.
    pub fn is_fatal_exit(&self) -> bool {
        self.source.is_network()
    }
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone)]
pub enum Event {
    StageStarted(Stage),
    /// One line of build output
    BuildOutput { artifact: String, line: String },
    Notice(String),
    Rendered(Report),
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub snapshot: MetricsSnapshot,
    pub report: Report,
    pub exporter: DeployOutcome,
    /// Every stage entered, in order, ending with `Done`
    pub transitions: Vec<Stage>,
}

impl RunSummary {
    /// Pretty-printed JSON document of the metrics, the report and the exporter state
    pub fn to_json(&self) -> common::Result<String> {
        let document = serde_json::json!({
            "metrics": self.snapshot,
            "report": self.report,
            "exporter": self.exporter,
        });
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

/// Drives one health check run against the configured target
pub struct HealthCheck<'a, R, M>
where
    R: CommandRunner + ?Sized,
    M: MetricsSource + ?Sized,
{
    config: &'a RunConfig,
    runner: &'a R,
    source: &'a M,
    stage: Stage,
    transitions: Vec<Stage>,
}

impl<'a, R, M> HealthCheck<'a, R, M>
where
    R: CommandRunner + ?Sized,
    M: MetricsSource + ?Sized,
{
    pub fn new(config: &'a RunConfig, runner: &'a R, source: &'a M) -> Self {
        Self {
            config,
            runner,
            source,
            stage: Stage::Idle,
            transitions: Vec::new(),
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stages entered by the last run
    pub fn transitions(&self) -> &[Stage] {
        &self.transitions
    }

    /// Run every stage in order, stopping at the first failure
    #[instrument(skip_all, fields(target = %self.config.target))]
    pub async fn run(
        &mut self,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> Result<RunSummary, StageFailure> {
        self.stage = Stage::Idle;
        self.transitions.clear();
        let start = Instant::now();

        match self.run_stages(on_event).await {
            Ok((snapshot, exporter)) => {
                self.enter(Stage::Rendering, on_event);
                let report = reporter::render(&snapshot);
                on_event(Event::Rendered(report.clone()));

                self.stage = Stage::Done;
                self.transitions.push(Stage::Done);
                info!(duration_ms = start.elapsed().as_millis(), "Health check completed");

                Ok(RunSummary {
                    snapshot,
                    report,
                    exporter,
                    transitions: self.transitions.clone(),
                })
            }
            Err(source) => {
                let stage = self.stage;
                error!(stage = %stage, error = %source, "Health check failed");
                self.stage = Stage::Failed;
                self.transitions.push(Stage::Failed);
                Err(StageFailure { stage, source })
            }
        }
    }

    async fn run_stages(
        &mut self,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> common::Result<(MetricsSnapshot, DeployOutcome)> {
        let config = self.config;

        if config.skip_build {
            on_event(Event::Notice("Skipped building containers".to_string()));
        } else {
            self.enter(Stage::Building, on_event);
            let builder = ArtifactBuilder::new(self.runner, config.runtime.as_str());
            for artifact in &config.artifacts {
                let name = artifact.name.clone();
                let mut forward = |line: &str| {
                    on_event(Event::BuildOutput {
                        artifact: name.clone(),
                        line: line.to_string(),
                    })
                };
                builder.build_artifact(artifact, &mut forward).await?;
            }
        }

        self.enter(Stage::DeployingExporter, on_event);
        let deployer = Deployer::new(
            self.runner,
            config.runtime.as_str(),
            config.archive_path.as_path(),
            config.remote_dir.as_str(),
        );
        let exporter = deployer
            .ensure_running(&config.target, &config.exporter_image, &config.run_spec)
            .await?;
        on_event(Event::Notice(match &exporter {
            DeployOutcome::Started { .. } => {
                format!("Exporter started on {}", config.target)
            }
            DeployOutcome::AlreadyRunning { .. } => {
                format!("Exporter already running on {}", config.target)
            }
        }));

        match &config.loki {
            Some(url) => on_event(Event::Notice(format!("Skipped to use Loki at {}", url))),
            None => {
                self.enter(Stage::DeployingLogPipeline, on_event);
                // TODO: deploy promtail and a Loki instance next to the exporter
                info!(target = %config.target, "No log pipeline to deploy");
            }
        }

        self.enter(Stage::FetchingMetrics, on_event);
        let host = config.target.metrics_host();
        let snapshot = self.source.fetch(host, config.exporter_port).await?;

        Ok((snapshot, exporter))
    }

    fn enter(&mut self, stage: Stage, on_event: &mut (dyn FnMut(Event) + Send)) {
        info!(stage = %stage, "Entering stage");
        self.stage = stage;
        self.transitions.push(stage);
        on_event(Event::StageStarted(stage));
    }
}
