//! Tracing / OpenTelemetry bootstrap for the fleetd controller.
//!
//! A single entry point, `init_tracing`, wires `tracing-subscriber` with an
//! env-filter and an optional OTLP exporter. The rest of the controller logs
//! through plain `tracing::info!`/`warn!`/`error!` macros rather than a
//! custom span model, matching how the teacher crate actually logs at its
//! call sites (`orchestrator.rs`) even though it also carries a heavier
//! hand-rolled telemetry model elsewhere.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct TracingOptions {
    pub service_name: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            service_name: "fleetd".to_string(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

/// Initialize global tracing. Safe to call once per process; a second call
/// is a logic error in the caller, not handled here.
pub fn init_tracing(opts: &TracingOptions) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if opts.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    tracing::info!(service = %opts.service_name, "tracing initialized");
}

#[cfg(feature = "otlp")]
pub mod otlp {
    use super::TracingOptions;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    /// Install an OTLP trace exporter alongside the fmt layer. Returns the
    /// tracer provider so the caller can shut it down cleanly at exit.
    pub fn init_otlp_tracer(
        opts: &TracingOptions,
    ) -> Result<opentelemetry_sdk::trace::TracerProvider, opentelemetry::trace::TraceError> {
        let endpoint = opts
            .otlp_endpoint
            .clone()
            .unwrap_or_else(|| "http://localhost:4317".to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_simple_exporter(exporter)
            .build();

        let _tracer = provider.tracer(opts.service_name.clone());
        Ok(provider)
    }
}
