//! Uyuni health check binary

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use uyuni_health_check::{
    Config, Event, HealthCheck, ProcessRunner, RunOverrides, RunSummary, setup_tracing,
};
use uyuni_metrics::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Check the health of an Uyuni server
#[derive(Debug, Parser)]
#[command(name = "uyuni-health-check", version, about)]
struct Cli {
    /// Uyuni server to check; the local host when omitted
    #[arg(short, long)]
    server: Option<String>,

    /// Port the exporter listens on
    #[arg(short, long)]
    exporter_port: Option<u16>,

    /// URL of an existing Loki instance; skips the log pipeline deployment
    #[arg(long)]
    loki: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format of the results
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Reuse previously built images
    #[arg(long)]
    skip_build: bool,
}

/// Prints run progress for the operator
struct Console {
    format: OutputFormat,
}

impl Console {
    fn heading(&self, text: &str) {
        match self.format {
            OutputFormat::Table => println!("\n# {}\n", text),
            OutputFormat::Json => eprintln!("# {}", text),
        }
    }

    fn line(&self, text: &str) {
        match self.format {
            OutputFormat::Table => println!("{}", text),
            OutputFormat::Json => eprintln!("{}", text),
        }
    }

    fn handle(&self, event: Event) {
        match event {
            Event::StageStarted(stage) => self.heading(stage.heading()),
            Event::BuildOutput { line, .. } => self.line(&line),
            Event::Notice(text) => self.line(&text),
            Event::Rendered(report) => {
                if self.format == OutputFormat::Table {
                    print!("{}", report);
                }
            }
        }
    }

    fn summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            let json = summary.to_json().context("Failed to encode results")?;
            println!("{}", json);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Tracing is not initialized yet, so config errors go straight to stderr
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let _telemetry_guard = setup_tracing(&config.telemetry, &config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Uyuni health check starting");
    match &config.source {
        Some(path) => tracing::info!("Configuration loaded from: {}", path.display()),
        None => tracing::info!("No configuration file found, using defaults"),
    }

    let run_config = config.to_run_config(RunOverrides {
        server: cli.server,
        exporter_port: cli.exporter_port,
        loki: cli.loki,
        skip_build: cli.skip_build,
    });

    let runner = ProcessRunner::new();
    let fetcher = HttpFetcher::new(run_config.fetch_timeout)
        .context("Failed to create the metrics HTTP client")?;

    let console = Console { format: cli.format };
    console.heading("Uyuni Health Check");

    let mut check = HealthCheck::new(&run_config, &runner, &fetcher);
    let mut on_event = |event: Event| console.handle(event);

    match check.run(&mut on_event).await {
        Ok(summary) => {
            console.summary(&summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            console.line(&format!("Error: {}", failure));
            if failure.is_fatal_exit() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
