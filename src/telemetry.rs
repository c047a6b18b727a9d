//! Telemetry initialization.
//!
//! Controlled by environment:
//! - `NEBI_LOG` (falls back to `RUST_LOG`) unset → no subscriber, zero overhead
//! - set → fmt layer on stderr filtered by that directive
//! - `NEBI_LOG_FORMAT=json` → JSON events with span close timings
//! - with the `otel` feature and `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans
//!   and events are also exported over OTLP HTTP
//!
//! ## Distributed tracing
//!
//! If `TRACEPARENT` is set (W3C Trace Context format), spans are created as
//! children of the remote parent. [`current_traceparent`] hands the current
//! context to `pixi` when `nebi run`/`nebi shell` spawn it.

use tracing_subscriber::EnvFilter;

/// Log filter directive.
pub const LOG_ENV: &str = "NEBI_LOG";
/// `json` switches the stderr formatter.
pub const LOG_FORMAT_ENV: &str = "NEBI_LOG_FORMAT";

/// Opaque guard; dropping it flushes and shuts down the OTLP pipeline.
/// Hold this in `main()` until exit.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    trace_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "otel")]
    log_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.trace_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel trace shutdown error: {e}");
            }
            if let Some(provider) = self.log_provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("otel log shutdown error: {e}");
            }
        }
    }
}

/// Output shape of the stderr layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// The filter directive, `NEBI_LOG` first.
fn filter_directive(nebi_log: Option<String>, rust_log: Option<String>) -> Option<String> {
    nebi_log
        .filter(|v| !v.trim().is_empty())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
}

/// Initialize telemetry from the environment.
///
/// Returns a guard that must be held until the program exits.
#[must_use]
pub fn init() -> TelemetryGuard {
    let directive = filter_directive(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    let otlp = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|v| !v.is_empty());

    match (directive, otlp) {
        (None, None) => init_noop(),
        #[cfg(feature = "otel")]
        (directive, Some(_)) => init_otlp(directive.as_deref().unwrap_or("info")),
        #[cfg(not(feature = "otel"))]
        (directive, Some(_)) => {
            eprintln!("warning: OTEL_EXPORTER_OTLP_ENDPOINT set but nebi built without 'otel' feature");
            match directive {
                Some(d) => init_stderr(&d),
                None => init_noop(),
            }
        }
        (Some(directive), None) => init_stderr(&directive),
    }
}

const fn init_noop() -> TelemetryGuard {
    TelemetryGuard {
        #[cfg(feature = "otel")]
        trace_provider: None,
        #[cfg(feature = "otel")]
        log_provider: None,
    }
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("warning: invalid {LOG_ENV} directive '{directive}': {e}; using 'info'");
        EnvFilter::new("info")
    })
}

fn init_stderr(directive: &str) -> TelemetryGuard {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let registry = tracing_subscriber::registry().with(env_filter(directive));
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: tracing already initialized: {e}");
    }
    init_noop()
}

/// OTLP HTTP export (traces + logs).
///
/// The SDK reads `OTEL_EXPORTER_OTLP_ENDPOINT` from the environment natively
/// and appends `/v1/traces` or `/v1/logs` as appropriate.
#[cfg(feature = "otel")]
fn init_otlp(directive: &str) -> TelemetryGuard {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let span_exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP span exporter: {e}");
            return init_stderr(directive);
        }
    };
    let resource = otel_resource();
    let trace_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_simple_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();
    let tracer = trace_provider.tracer(env!("CARGO_PKG_NAME"));
    let trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let log_exporter = match opentelemetry_otlp::LogExporter::builder()
        .with_http()
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP log exporter: {e}");
            return init_stderr(directive);
        }
    };
    let log_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_simple_exporter(log_exporter)
        .with_resource(resource)
        .build();
    let log_layer =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&log_provider);

    install_parent_context();

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter(directive))
        .with(trace_layer)
        .with(log_layer)
        .try_init()
    {
        eprintln!("warning: tracing already initialized: {e}");
    }

    TelemetryGuard {
        trace_provider: Some(trace_provider),
        log_provider: Some(log_provider),
    }
}

/// The current span's trace context as a W3C `TRACEPARENT` string.
#[cfg(feature = "otel")]
#[must_use]
pub fn current_traceparent() -> Option<String> {
    use opentelemetry::propagation::TextMapPropagator as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use std::collections::HashMap;

    let propagator = TraceContextPropagator::new();
    let mut carrier: HashMap<String, String> = HashMap::new();
    propagator.inject(&mut carrier);
    carrier.remove("traceparent")
}

#[cfg(not(feature = "otel"))]
#[must_use]
pub fn current_traceparent() -> Option<String> {
    None
}

#[cfg(feature = "otel")]
fn install_parent_context() {
    use opentelemetry::propagation::TextMapPropagator as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use std::collections::HashMap;

    if let Ok(traceparent) = std::env::var("TRACEPARENT") {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.insert("traceparent".to_owned(), traceparent);
        let cx = TraceContextPropagator::new().extract(&carrier);
        // Leaked so the remote parent stays attached for the whole process.
        std::mem::forget(cx.attach());
    }
}

#[cfg(feature = "otel")]
fn otel_resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;
    opentelemetry_sdk::Resource::builder()
        .with_attribute(KeyValue::new("service.name", env!("CARGO_PKG_NAME")))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}
