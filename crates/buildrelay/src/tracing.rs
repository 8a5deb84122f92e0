//! Diagnostics for the relay process
//!
//! Stdout carries the build's own log, so every diagnostic goes to stderr.
//! Each process gets one correlation id, shared by the run span, the JSON
//! error report and the initialization event.

use std::io;
use std::sync::OnceLock;
pub use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Crates whose events pass the default filter.
const TARGETS: [&str; 4] = ["buildrelay", "buildrelay_core", "buildrelay_aws", "buildrelay_ci"];

/// Shape of the stderr diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Multi-line, with event targets
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event, for CI log processors
    Json,
}

/// `--level` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Every event, including SDK request tracing
    Trace,
    /// Poll and pagination detail
    Debug,
    /// Lifecycle milestones
    Info,
    /// Degraded steps only
    Warn,
    /// Failures only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Settings for [`init_tracing`]
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output shape
    pub format: TracingFormat,
    /// Applied to the relay crates when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    /// Full directive string, taking precedence over `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
        }
    }
}

static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Correlation id of this process, created on first use.
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Filter directive enabling `level` for every relay crate and nothing else.
#[must_use]
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn stderr_layer(format: TracingFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    match format {
        TracingFormat::Pretty => layer.pretty().boxed(),
        TracingFormat::Compact => layer.compact().with_target(false).boxed(),
        TracingFormat::Json => layer.json().with_current_span(true).boxed(),
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns an error if the filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let filter = match config.filter {
        Some(directive) => EnvFilter::try_new(directive),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive(config.level))),
    }
    .map_err(|e| miette::miette!("invalid log filter: {e}"))?;

    tracing_subscriber::registry()
        .with(stderr_layer(config.format))
        .with(filter)
        .init();

    tracing::debug!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        "Diagnostics enabled"
    );
    Ok(())
}

/// Span wrapping one relay run, tagged with the project and correlation id.
#[macro_export]
macro_rules! run_span {
    ($project:expr) => {
        tracing::info_span!(
            "run",
            project = $project,
            correlation_id = %$crate::tracing::correlation_id(),
            start_time = %chrono::Utc::now().to_rfc3339(),
        )
    };
}
