//! Tracing pipeline for the bridge.
//!
//! Call [`init_tracing`] once at process startup.  Every car leaves a span
//! tree behind it, rooted at the connection it arrived on:
//!
//! ```text
//! ws_session{peer, conn_id}          one per WebSocket client
//! └─ handle_request{car_id}          validate + admit
//!    └─ release{car_id, delay_ms}    the sleeping release task
//! ```
//!
//! `release` is created while `handle_request` is entered, so even though it
//! runs on its own Tokio task an exported trace shows the whole crossing from
//! admission to release.  Log events emitted inside these spans (`car
//! admitted`, `car released`, delivery warnings) inherit their fields.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`). When set, the spans above are exported. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `ONELANE_LOG_FORMAT=json` | Newline-delimited JSON logs, span fields included. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = onelane_server::telemetry::init_tracing("onelane");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{SdkTracer, SdkTracerProvider},
    Resource,
};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter,
};

/// Environment variable that switches log output to JSON.
pub const LOG_FORMAT_ENV: &str = "ONELANE_LOG_FORMAT";

/// Instrumentation scope name attached to every exported span.
const TRACER_NAME: &str = "onelane";

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber: filter, optional OTLP span export, then a
/// compact or JSON console formatter.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes spans still queued for export.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref());
    let json = wants_json(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let provider = build_provider(service_name);

    tracing_subscriber::registry()
        .with(filter)
        .with(provider.as_ref().map(otel_layer))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().compact()))
        .init();

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported to an OTLP collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[onelane] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `RUST_LOG` if it parses, otherwise [`DEFAULT_FILTER`].
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

/// Bridges `tracing` spans into OpenTelemetry spans owned by `provider`.
fn otel_layer<S>(provider: &SdkTracerProvider) -> OpenTelemetryLayer<S, SdkTracer>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME))
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Returns `None` when the variable is absent or the exporter cannot be
/// initialised (the error goes to stderr, since no subscriber exists yet).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[onelane] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // `init_tracing` runs before the Tokio runtime exists, so the
            // batch exporter's background task has nowhere to live.
            .with_simple_exporter(exporter)
            .build(),
    )
}
