//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with a pretty or JSON format and
//! `RUST_LOG` filtering.
//!
//! Everything goes to stderr. Stdout carries the command's JSON output so
//! it can be piped into `jq`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// JSON lines, one event per line.
    Json,
}

/// Initialize the global tracing subscriber. Call once, early in `main()`.
///
/// `RUST_LOG` overrides `default_level` when set, e.g.
///
/// ```text
/// RUST_LOG=shadowpost=debug,shadowpost_protocol=trace
/// ```
pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .init();
        }
    }

    tracing::debug!(?format, "logging initialized");
}
