//! Tracing setup, optionally exporting spans over OTLP
//!
//! Log lines always go to stderr; stdout carries the report only.

use crate::config::{LoggingSettings, TelemetrySettings};
use common::logging::{self, LogFormat};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build and install the OTLP tracer provider
///
/// Returns `None` when telemetry is disabled.
pub fn init_telemetry(
    settings: &TelemetrySettings,
) -> Result<Option<TracerProvider>, Box<dyn std::error::Error>> {
    if !settings.enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.otlp_endpoint.as_str())
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(Some(provider))
}

/// Install the global subscriber
///
/// Must run inside a Tokio runtime when telemetry is enabled, the batch
/// span processor spawns onto it.
pub fn setup_tracing(
    telemetry: &TelemetrySettings,
    logging_settings: &LoggingSettings,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    let level = logging_settings.level.as_deref().unwrap_or("info");
    let format = logging_settings
        .format
        .as_deref()
        .map(LogFormat::from_name)
        .unwrap_or_default();

    let Some(provider) = init_telemetry(telemetry)? else {
        logging::init_with(format, level);
        tracing::debug!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    };

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(telemetry.service_name.clone()));

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(logging::env_filter(level))
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .init();

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}
