//! ## blockpool-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! ### Expectations:
//! - One global `fmt` subscriber, filtered by `RUST_LOG` or the configured default
//! - Pool lifecycle events carry OpenTelemetry key/value metadata

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` takes precedence over
    /// `default_filter`. Calling it again after a subscriber is installed
    /// has no effect.
    pub fn init(default_filter: &str) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init();
    }

    #[inline]
    pub fn log_event(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!("pool_event", event_type = event_type, otel.kind = "INTERNAL");
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "Pool event recorded");
    }
}
