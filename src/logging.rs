//! Logging initialization.
//!
//! Plain `tracing-subscriber` to stderr, filtered by `RUST_LOG` (falling
//! back to `info`). `--format json` selects the JSON event formatter;
//! otherwise output is the compact human-readable formatter. There is no
//! OTLP exporter here — unlike some of the ecosystem's heavier CLIs, this
//! one runs as a short-lived, single-host process with nothing to export
//! spans to.

use tracing_subscriber::EnvFilter;

/// Output format for log lines and CLI reports alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact, human-readable.
    #[default]
    Pretty,
    /// Newline-delimited JSON, one object per event.
    Json,
}

/// Install the global subscriber. Call once, at process start.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
                .try_init();
        }
    }
}
