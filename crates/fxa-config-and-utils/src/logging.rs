//! Logging initialization.
//!
//! Every crate logs through `tracing` macros; only the binary calls
//! [`init_logging`]. Output goes to stderr so stdout stays free for URLs and
//! profile lines the user may want to pipe.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// Structured JSONL, one object per event.
    Json,
}

impl LogFormat {
    /// Read the format from `FXA_SAMPLE_LOG_FORMAT` (`json` or anything else).
    pub fn from_env() -> Self {
        match std::env::var("FXA_SAMPLE_LOG_FORMAT")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more than
/// once is harmless; later calls are ignored.
///
/// ```ignore
/// init_logging("info", LogFormat::from_env());
/// tracing::info!("sample started");
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string().to_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
