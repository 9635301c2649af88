use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const SERVICE_NAME: &str = "sidecar-injector";

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter {0:?}: {1}")]
    InvalidFilter(String, #[source] tracing_subscriber::filter::ParseError),

    #[error("failed to build OTLP span exporter: {0}")]
    Exporter(String),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[source] tracing_subscriber::util::TryInitError),
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn clamp_ratio(sample_ratio: f64) -> f64 {
    if sample_ratio.is_nan() {
        0.0
    } else {
        sample_ratio.clamp(0.0, 1.0)
    }
}

fn sampler(sample_ratio: f64) -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(clamp_ratio(
        sample_ratio,
    ))))
}

fn tracer_provider(url: &str, sample_ratio: f64) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(url)
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(sampler(sample_ratio))
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

/// Install the global tracing subscriber.
///
/// Log lines go to stdout as text or JSON. When `tracing_url` is set, spans are also exported
/// over OTLP/gRPC, sampled at `sample_ratio` unless the caller already sampled the trace.
pub async fn init(
    log_filter: &str,
    log_format: LogFormat,
    tracing_url: Option<&str>,
    sample_ratio: f64,
) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(log_filter)
        .map_err(|e| TelemetryError::InvalidFilter(log_filter.to_string(), e))?;

    let fmt_layer = match log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
    };

    let otel_layer = match tracing_url {
        Some(url) => {
            let provider = tracer_provider(url, sample_ratio)?;
            let tracer = provider.tracer(SERVICE_NAME);
            opentelemetry::global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(otel_layer)
        .try_init()
        .map_err(TelemetryError::Subscriber)?;

    tracing::debug!(msg = "telemetry initialized", ?log_format, tracing = tracing_url.is_some());
    Ok(())
}
