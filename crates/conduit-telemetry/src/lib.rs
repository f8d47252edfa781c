//! Logging and trace export for conduit
//!
//! Installs a `tracing` subscriber with an env filter, a text or JSON fmt
//! layer, and an optional OTLP span exporter.

mod metadata;

use conduit_config::{LogFormat, OtlpExporterConfig, OtlpProtocol, SamplingConfig, TelemetryConfig};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps span export alive; pending spans are flushed when dropped
pub struct TelemetryGuard {
    spans: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.spans.take() else {
            return;
        };
        // The subscriber may already be gone at this point
        if let Err(e) = provider.shutdown() {
            eprintln!("conduit: span export did not shut down cleanly: {e}");
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `default_level`. Hold the returned guard until the
/// process exits.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or a global
/// subscriber is already installed
pub fn init(config: Option<&TelemetryConfig>, default_level: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let spans = match config {
        Some(telemetry) => telemetry
            .otlp()
            .map(|otlp| tracer_provider(telemetry, otlp))
            .transpose()?,
        None => None,
    };

    let otel_layer = spans.as_ref().map(|provider| {
        global::set_tracer_provider(provider.clone());
        tracing_opentelemetry::layer().with_tracer(provider.tracer("conduit"))
    });

    tracing_subscriber::registry()
        .with(log_layer(config.map_or(LogFormat::Text, |c| c.log_format)))
        .with(otel_layer)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(otlp) = config.and_then(TelemetryConfig::otlp) {
        tracing::info!(endpoint = %otlp.endpoint, protocol = ?otlp.protocol, "exporting spans over OTLP");
    }

    Ok(TelemetryGuard { spans })
}

fn log_layer(format: LogFormat) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer().with_target(true);

    match format {
        LogFormat::Json => layer.json().with_current_span(true).flatten_event(true).boxed(),
        LogFormat::Text => layer.compact().boxed(),
    }
}

fn tracer_provider(config: &TelemetryConfig, otlp: &OtlpExporterConfig) -> anyhow::Result<SdkTracerProvider> {
    let exporter = match otlp.protocol {
        OtlpProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp.endpoint.as_str())
            .build(),
        OtlpProtocol::HttpProto => SpanExporter::builder()
            .with_http()
            .with_endpoint(otlp.endpoint.as_str())
            .with_headers(otlp.headers.clone())
            .build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build {:?} span exporter: {e}", otlp.protocol))?;

    Ok(SdkTracerProvider::builder()
        .with_resource(metadata::build_resource(config))
        .with_sampler(sampler(config.sampling))
        .with_batch_exporter(exporter)
        .build())
}

fn sampler(sampling: SamplingConfig) -> Sampler {
    let ratio = sampling.ratio.clamp(0.0, 1.0);
    let root = if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    };

    if sampling.parent_based {
        Sampler::ParentBased(Box::new(root))
    } else {
        root
    }
}
