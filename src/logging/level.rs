//! Logging granularity
//!
//! Levels are ordered by verbosity: `Fit` is the least verbose (one record per
//! run), `Batch` the most.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Granularity a record is logged at, and the verbosity a logger is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fit,
    Epoch,
    Batch,
}

impl LogLevel {
    /// Get the name written in record prefixes
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Fit => "FIT",
            LogLevel::Epoch => "EPOCH",
            LogLevel::Batch => "BATCH",
        }
    }

    /// Check whether this level is subject to `log_interval` gating
    pub fn is_interval_gated(&self) -> bool {
        matches!(self, LogLevel::Epoch | LogLevel::Batch)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fit" => Ok(LogLevel::Fit),
            "epoch" => Ok(LogLevel::Epoch),
            "batch" => Ok(LogLevel::Batch),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Fit => tracing::Level::INFO,
            LogLevel::Epoch => tracing::Level::DEBUG,
            LogLevel::Batch => tracing::Level::TRACE,
        }
    }
}
