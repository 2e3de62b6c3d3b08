//! Tracing subscriber setup.
//!
//! Events are filtered by `RUST_LOG` (default `info`) and written to stderr,
//! so a report printed on stdout stays machine readable.

use std::sync::Once;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "info";

static INIT: Once = Once::new();

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, with the current span attached.
    Json,
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(format: LogFormat) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let text = (format == LogFormat::Text).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_line_number(true)
        });
        let json = (format == LogFormat::Json).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
        });

        // A test harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(text)
            .with(json)
            .try_init();

        tracing::debug!(?format, "tracing initialized");
    });
}

/// `info`-level span; used for the per-request span.
#[macro_export]
macro_rules! span_trace {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

/// Log an error at `error` level with some context and hand it back.
#[macro_export]
macro_rules! log_error {
    ($err:expr, $context:expr) => {{
        let err = $err;
        tracing::error!(error = %err, context = $context, "request failed");
        err
    }};
}
