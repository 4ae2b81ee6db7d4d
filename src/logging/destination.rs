//! Logging destinations and the facade that fans records out to them

use std::path::Path;

use serde::Serialize;

use super::level::LogLevel;
use super::record::LogRecord;
use crate::error::LoggerResult;
use crate::state::{Event, Timer};

/// Something that receives records and lifecycle events
///
/// # Object Safety
/// This trait is object-safe so the [`Logger`] can hold `Box<dyn LoggingDestination>`.
pub trait LoggingDestination {
    /// Accept a record; the destination decides whether to keep it
    fn record(&mut self, record: &LogRecord) -> LoggerResult<()>;

    /// React to a training lifecycle event
    fn run_event(&mut self, event: Event, timer: &Timer) -> LoggerResult<()> {
        let _ = (event, timer);
        Ok(())
    }

    /// Persist everything accepted so far
    fn flush(&mut self) -> LoggerResult<()>;

    /// Flush and release resources; calling it twice is a no-op
    fn close(&mut self) -> LoggerResult<()>;
}

/// Receiver of flushed log files
///
/// Whether `overwrite = false` replaces or versions an existing artifact is up
/// to the sink.
pub trait ArtifactSink: Send + Sync {
    fn log_file_artifact(
        &self,
        level: LogLevel,
        artifact_name: &str,
        file_path: &Path,
        overwrite: bool,
    ) -> anyhow::Result<()>;
}

/// Facade the training loop and callbacks log through
#[derive(Default)]
pub struct Logger {
    destinations: Vec<Box<dyn LoggingDestination>>,
    closed: bool,
}

impl Logger {
    pub fn new(destinations: Vec<Box<dyn LoggingDestination>>) -> Self {
        Self {
            destinations,
            closed: false,
        }
    }

    pub fn add_destination(&mut self, destination: Box<dyn LoggingDestination>) {
        self.destinations.push(destination);
    }

    /// Serialize `data` once and hand the record to every destination
    pub fn log_data<T: Serialize + ?Sized>(
        &mut self,
        level: LogLevel,
        step: u64,
        data: &T,
    ) -> LoggerResult<()> {
        let record = LogRecord::new(level, step, data)?;
        self.log_record(&record)
    }

    pub fn log_record(&mut self, record: &LogRecord) -> LoggerResult<()> {
        for destination in self.destinations.iter_mut() {
            destination.record(record)?;
        }
        Ok(())
    }

    pub fn data_fit<T: Serialize + ?Sized>(&mut self, step: u64, data: &T) -> LoggerResult<()> {
        self.log_data(LogLevel::Fit, step, data)
    }

    pub fn data_epoch<T: Serialize + ?Sized>(&mut self, step: u64, data: &T) -> LoggerResult<()> {
        self.log_data(LogLevel::Epoch, step, data)
    }

    pub fn data_batch<T: Serialize + ?Sized>(&mut self, step: u64, data: &T) -> LoggerResult<()> {
        self.log_data(LogLevel::Batch, step, data)
    }

    pub fn run_event(&mut self, event: Event, timer: &Timer) -> LoggerResult<()> {
        for destination in self.destinations.iter_mut() {
            destination.run_event(event, timer)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> LoggerResult<()> {
        for destination in self.destinations.iter_mut() {
            destination.flush()?;
        }
        Ok(())
    }

    /// Close every destination, returning the first failure
    ///
    /// A failed close leaves the facade open so it can be retried; already
    /// closed destinations ignore the repeat.
    pub fn close(&mut self) -> LoggerResult<()> {
        if self.closed {
            return Ok(());
        }
        let mut first_error = None;
        for destination in self.destinations.iter_mut() {
            if let Err(e) = destination.close() {
                tracing::warn!("Failed to close logging destination: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                self.closed = true;
                Ok(())
            }
        }
    }
}

/// Mirrors records into the process log as `tracing` events
///
/// FIT records are emitted at `INFO`, EPOCH at `DEBUG` and BATCH at `TRACE`.
/// Records more verbose than `log_level` are ignored.
#[derive(Debug, Clone)]
pub struct TracingDestination {
    log_level: LogLevel,
}

impl TracingDestination {
    pub fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }
}

impl LoggingDestination for TracingDestination {
    fn record(&mut self, record: &LogRecord) -> LoggerResult<()> {
        if record.level() > self.log_level {
            return Ok(());
        }
        let line = record.to_line();
        let line = line.trim_end();
        match tracing::Level::from(record.level()) {
            tracing::Level::INFO => tracing::info!(target: "trainlog::records", "{}", line),
            tracing::Level::DEBUG => tracing::debug!(target: "trainlog::records", "{}", line),
            _ => tracing::trace!(target: "trainlog::records", "{}", line),
        }
        Ok(())
    }

    fn flush(&mut self) -> LoggerResult<()> {
        Ok(())
    }

    fn close(&mut self) -> LoggerResult<()> {
        Ok(())
    }
}
