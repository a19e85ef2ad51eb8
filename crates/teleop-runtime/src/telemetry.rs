//! Tracing pipeline initialisation for the teleoperation stack.
//!
//! Call [`init_tracing`] once at process startup to wire up the `tracing`
//! subscriber with an optional OTLP span exporter.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `TELEOP_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! Logs go to the writer the caller supplies.  The CLI passes a writer that
//! translates line endings because the terminal is in raw mode while the
//! session is active.
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = teleop_runtime::telemetry::init_tracing("teleop", std::io::stderr);
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global `tracing` subscriber with an optional OTLP exporter.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is set an OTLP/HTTP span exporter is
/// configured and every span opened by the session (connect, homing, active,
/// shutdown) is forwarded to the collector.  Without it the function falls
/// back to a plain formatter writing through `make_writer`.
///
/// Keep the returned guard alive until exit; dropping it flushes pending
/// spans.  A second call leaves the first subscriber in place.
pub fn init_tracing<W>(service_name: &str, make_writer: W) -> TracerProviderGuard
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let fmt_layer = match std::env::var("TELEOP_LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt::layer()
            .with_writer(make_writer)
            .json()
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(make_writer)
            .compact()
            .boxed(),
    };

    let provider = build_provider(service_name);
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("teleop")));

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(otel)
        .try_init()
    {
        eprintln!("[teleop] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[teleop] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `None` without `OTEL_EXPORTER_OTLP_ENDPOINT`, or when the exporter fails to
/// build (reported on stderr).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[teleop] OTLP exporter init failed: {e}"))
        .ok()?;

    // No async runtime exists in this process; export spans inline.
    let provider = SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .with_simple_exporter(exporter)
        .build();
    Some(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_returns_none_without_endpoint() {
        // SAFETY: no other test in this crate reads this env-var.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("teleop-test").is_none());
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        drop(TracerProviderGuard(None));
    }

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        let first = init_tracing("teleop-test", std::io::sink);
        let second = init_tracing("teleop-test", std::io::sink);
        tracing::info!("still logging");
        drop(second);
        drop(first);
    }
}
