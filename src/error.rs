//! Error taxonomy for the logging stack

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by loggers and logging destinations
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Invalid thresholds or paths in the logger configuration
    #[error("invalid logger configuration: {0}")]
    Configuration(String),

    /// A payload could not be turned into a string-keyed map of values
    #[error("failed to serialize log payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Opening, writing or syncing the destination file failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Redirecting stdout/stderr failed
    #[error("failed to capture {stream}: {source}")]
    Capture {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// An artifact sink rejected a flushed log file
    #[error("artifact sink failed for '{name}': {source}")]
    Artifact {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The logger was used after `close()`
    #[error("logger is closed")]
    Closed,
}

impl LoggerError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoggerError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for logger operations
pub type LoggerResult<T> = std::result::Result<T, LoggerError>;
