//! Logging system for training runs
//!
//! Provides the level-gated file logger with stdout/stderr capture, the
//! logging facade that fans records out to destinations, and process-log
//! initialisation for the driver.

mod buffer;
mod capture;
mod destination;
mod file_logger;
mod finite;
mod level;
mod record;

pub use destination::{ArtifactSink, Logger, LoggingDestination, TracingDestination};
pub use file_logger::{FileLogger, LoggerState};
pub use level::LogLevel;
pub use record::LogRecord;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialise the process log on stderr
///
/// `RUST_LOG` overrides `default_filter`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
