//! Structured logging using **tracing**.
//!
//! Events go to stderr so stdout stays clean for reports. The library only
//! emits events; installing a subscriber is the binary's job.

use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Text,
    /// One JSON object per event, for log collectors
    Json,
}

/// Initializes the global tracing subscriber.
///
/// Call once at startup. Filtering follows `RUST_LOG`
/// (e.g. `RUST_LOG=ghostbust_core=debug`) and defaults to warnings only.
pub fn init_structured_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder
            .json()
            .with_ansi(false)
            .with_current_span(true)
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("[WARN] logging already initialized: {}", e);
    }
}
