//! Tracing pipeline for BoneGuide processes.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `BONEGUIDE_LOG_FORMAT=json` | Newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Enables the OTLP/HTTP span exporter. |
//!
//! ```rust,no_run
//! let _guard = boneguide_runtime::telemetry::init_tracing("boneguide");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.  Hold the returned guard until exit so
/// pending spans are flushed.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("BONEGUIDE_LOG_FORMAT").as_deref() == Ok("json");

    let provider = build_provider(service_name);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if let Some(p) = &provider {
        let tracer = p.tracer("boneguide");
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
    }
    layers.push(if use_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    });

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the OTel provider down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[boneguide] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[boneguide] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The CLI builds its Tokio runtime after this call, so the batch
            // exporter cannot be used here.
            .with_simple_exporter(exporter)
            .build(),
    )
}
