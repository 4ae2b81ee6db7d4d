//! Buffered, level-gated file logger
//!
//! Records are gated by level and `log_interval`, buffered as formatted lines,
//! and written to a single log file. Lines are written when `flush_interval`
//! of them are pending; lifecycle events force a full flush (write, fsync and
//! artifact notification).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::buffer::LineBuffer;
use super::capture::StreamCapture;
use super::destination::{ArtifactSink, LoggingDestination};
use super::level::LogLevel;
use super::record::LogRecord;
use crate::config::{FileLoggerConfig, RunContext};
use crate::error::{LoggerError, LoggerResult};
use crate::state::{Event, Timer};

/// Lifecycle of a [`FileLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Active,
    Closed,
}

/// File-backed logging destination
pub struct FileLogger {
    config: FileLoggerConfig,
    /// Resolved log file path
    path: PathBuf,
    /// Resolved artifact name, if notifications are enabled
    artifact_name: Option<String>,
    writer: Option<BufWriter<File>>,
    buffer: LineBuffer,
    capture: StreamCapture,
    sinks: Vec<Arc<dyn ArtifactSink>>,
    state: LoggerState,
    /// Whether the batch in progress is on the logging interval
    is_batch_interval: bool,
    /// Whether the epoch in progress is on the logging interval
    is_epoch_interval: bool,
    /// Lines written to the file since the last artifact notification
    lines_since_notify: usize,
    flush_count: usize,
}

impl FileLogger {
    /// Validate the configuration, open the log file and start stream capture
    pub fn new(config: FileLoggerConfig, run: &RunContext) -> LoggerResult<Self> {
        config.validate()?;

        let path = PathBuf::from(run.resolve(&config.filename));
        let artifact_name = config.artifact_name.as_deref().map(|n| run.resolve(n));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LoggerError::io(parent, e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if config.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&path).map_err(|e| LoggerError::io(&path, e))?;
        let writer = BufWriter::with_capacity(config.buffer_size, file);

        // Started last so a failed open never leaves the streams redirected
        let capture = StreamCapture::start(config.capture_stdout, config.capture_stderr)?;

        tracing::info!(
            "Logging {} records to {}",
            config.log_level,
            path.display()
        );

        Ok(Self {
            buffer: LineBuffer::new(config.flush_interval),
            config,
            path,
            artifact_name,
            writer: Some(writer),
            capture,
            sinks: Vec::new(),
            state: LoggerState::Active,
            is_batch_interval: false,
            is_epoch_interval: false,
            lines_since_notify: 0,
            flush_count: 0,
        })
    }

    /// Register a sink notified with the log file on every flush
    pub fn add_artifact_sink(&mut self, sink: Arc<dyn ArtifactSink>) {
        self.sinks.push(sink);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifact_name(&self) -> Option<&str> {
        self.artifact_name.as_deref()
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.log_level
    }

    pub fn state(&self) -> LoggerState {
        self.state
    }

    /// Number of lines waiting to be written
    pub fn buffered_lines(&self) -> usize {
        self.buffer.len()
    }

    /// Number of completed flushes
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    fn ensure_active(&self) -> LoggerResult<()> {
        match self.state {
            LoggerState::Active => Ok(()),
            LoggerState::Closed => Err(LoggerError::Closed),
        }
    }

    /// Decide whether a record at `level` is written
    ///
    /// FIT records always are. Levels less verbose than the configured one are
    /// always written, more verbose ones never; the configured level itself is
    /// written only on the `log_interval`.
    pub fn will_log(&self, level: LogLevel) -> bool {
        use std::cmp::Ordering;

        if !level.is_interval_gated() {
            return true;
        }
        match level.cmp(&self.config.log_level) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal if level == LogLevel::Batch => self.is_batch_interval,
            Ordering::Equal => self.is_epoch_interval,
        }
    }

    /// Latch whether the batch starting now is on the logging interval
    pub fn on_batch_start(&mut self, timer: &Timer) -> LoggerResult<()> {
        self.ensure_active()?;
        self.is_batch_interval = (timer.batch + 1) % self.config.log_interval == 0;
        self.collect_captured()
    }

    /// Latch the epoch interval and flush whatever was logged before the epoch
    pub fn on_epoch_start(&mut self, timer: &Timer) -> LoggerResult<()> {
        self.ensure_active()?;
        self.is_epoch_interval = (timer.epoch + 1) % self.config.log_interval == 0;
        self.flush()
    }

    pub fn on_batch_end(&mut self) -> LoggerResult<()> {
        self.ensure_active()?;
        if self.config.log_level == LogLevel::Batch {
            self.flush()
        } else {
            self.collect_captured()
        }
    }

    pub fn on_epoch_end(&mut self) -> LoggerResult<()> {
        self.ensure_active()?;
        if self.config.log_level >= LogLevel::Epoch {
            self.flush()
        } else {
            self.collect_captured()
        }
    }

    pub fn on_eval_start(&mut self) -> LoggerResult<()> {
        self.ensure_active()?;
        self.flush()
    }

    /// Move captured stream output into the buffer
    fn collect_captured(&mut self) -> LoggerResult<()> {
        for line in self.capture.take_lines() {
            self.push_line(line)?;
        }
        Ok(())
    }

    fn push_line(&mut self, line: String) -> LoggerResult<()> {
        if self.buffer.push(line) {
            self.write_buffered()?;
        }
        Ok(())
    }

    /// Write pending lines into the file writer, in arrival order
    fn write_buffered(&mut self) -> LoggerResult<()> {
        let lines = self.buffer.drain();
        if lines.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(LoggerError::Closed)?;
        for line in &lines {
            writer
                .write_all(line.as_bytes())
                .map_err(|e| LoggerError::io(&self.path, e))?;
        }
        self.lines_since_notify += lines.len();
        Ok(())
    }

    fn flush_inner(&mut self) -> LoggerResult<()> {
        self.write_buffered()?;

        let writer = self.writer.as_mut().ok_or(LoggerError::Closed)?;
        writer.flush().map_err(|e| LoggerError::io(&self.path, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| LoggerError::io(&self.path, e))?;
        self.flush_count += 1;

        let written = std::mem::take(&mut self.lines_since_notify);
        tracing::debug!(
            "Flushed {} lines to {} (flush #{})",
            written,
            self.path.display(),
            self.flush_count
        );

        if written == 0 && !self.config.notify_on_empty_flush {
            return Ok(());
        }
        self.notify_sinks()
    }

    fn notify_sinks(&self) -> LoggerResult<()> {
        let Some(name) = self.artifact_name.as_deref() else {
            return Ok(());
        };
        for sink in &self.sinks {
            sink.log_file_artifact(self.config.log_level, name, &self.path, true)
                .map_err(|source| LoggerError::Artifact {
                    name: name.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl LoggingDestination for FileLogger {
    fn record(&mut self, record: &LogRecord) -> LoggerResult<()> {
        self.ensure_active()?;
        self.collect_captured()?;
        if !self.will_log(record.level()) {
            return Ok(());
        }
        self.push_line(record.to_line())
    }

    fn run_event(&mut self, event: Event, timer: &Timer) -> LoggerResult<()> {
        match event {
            Event::Init => {
                self.ensure_active()?;
                self.collect_captured()
            }
            Event::EpochStart => self.on_epoch_start(timer),
            Event::BatchStart => self.on_batch_start(timer),
            Event::BatchEnd => self.on_batch_end(),
            Event::EpochEnd => self.on_epoch_end(),
            Event::EvalStart => self.on_eval_start(),
        }
    }

    /// Write every buffered line, fsync, and notify artifact sinks
    fn flush(&mut self) -> LoggerResult<()> {
        self.ensure_active()?;
        self.collect_captured()?;
        self.flush_inner()
    }

    /// Restore captured streams, flush what they produced and close the file
    fn close(&mut self) -> LoggerResult<()> {
        if self.state == LoggerState::Closed {
            return Ok(());
        }
        self.state = LoggerState::Closed;

        let mut result = Ok(());
        for line in self.capture.stop() {
            if let Err(e) = self.push_line(line) {
                result = Err(e);
                break;
            }
        }
        let result = result.and_then(|_| self.flush_inner());

        self.buffer.clear();
        self.writer = None;
        tracing::info!(
            "Closed log file {} after {} flushes",
            self.path.display(),
            self.flush_count
        );
        result
    }
}

impl Drop for FileLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close log file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Tracker {
        logged: Mutex<Vec<(LogLevel, String, PathBuf)>>,
    }

    impl ArtifactSink for Tracker {
        fn log_file_artifact(
            &self,
            level: LogLevel,
            artifact_name: &str,
            file_path: &Path,
            _overwrite: bool,
        ) -> anyhow::Result<()> {
            self.logged
                .lock()
                .unwrap()
                .push((level, artifact_name.to_string(), file_path.to_path_buf()));
            Ok(())
        }
    }

    impl Tracker {
        fn count(&self) -> usize {
            self.logged.lock().unwrap().len()
        }
    }

    fn test_config(temp_dir: &TempDir, level: LogLevel) -> FileLoggerConfig {
        let mut config =
            FileLoggerConfig::new(temp_dir.path().join("output.log").to_string_lossy());
        config.log_level = level;
        config.artifact_name = Some("{run_name}/rank{rank}.log".to_string());
        config
    }

    fn record(level: LogLevel, step: u64, metric: &str) -> LogRecord {
        LogRecord::new(level, step, &json!({ "metric": metric })).unwrap()
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Epoch);
        config.log_interval = 0;

        let result = FileLogger::new(config, &RunContext::new("r", 0));
        assert!(matches!(result, Err(LoggerError::Configuration(_))));
    }

    #[test]
    fn test_new_refuses_existing_file_without_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("output.log"), "old\n").unwrap();

        let config = test_config(&temp_dir, LogLevel::Epoch);
        let result = FileLogger::new(config.clone(), &RunContext::new("r", 0));
        assert!(matches!(result, Err(LoggerError::Io { .. })));

        let mut config = config;
        config.overwrite = true;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        logger.close().unwrap();
        assert_eq!(read(logger.path()), "");
    }

    #[test]
    fn test_templated_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config = FileLoggerConfig {
            filename: format!("{}/{{run_name}}/logs-rank{{rank}}.txt", temp_dir.path().display()),
            artifact_name: Some("{run_name}/rank{rank}.log".to_string()),
            ..FileLoggerConfig::default()
        };

        let logger = FileLogger::new(config, &RunContext::new("sweep", 2)).unwrap();

        assert_eq!(
            logger.path(),
            temp_dir.path().join("sweep").join("logs-rank2.txt")
        );
        assert_eq!(logger.artifact_name(), Some("sweep/rank2.log"));
        assert!(logger.path().exists());
    }

    #[test]
    fn test_fit_records_always_written() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Fit);
        config.log_interval = 5;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();

        logger.record(&record(LogLevel::Fit, 1, "fit")).unwrap();
        logger.record(&record(LogLevel::Epoch, 1, "epoch")).unwrap();
        logger.record(&record(LogLevel::Batch, 1, "batch")).unwrap();
        logger.close().unwrap();

        assert_eq!(read(logger.path()), "[FIT][batch=1]: { \"metric\": \"fit\", }\n");
    }

    #[test]
    fn test_batch_interval_gating() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Batch);
        config.log_interval = 2;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let mut timer = Timer::new();

        for _ in 0..4 {
            logger.on_batch_start(&timer).unwrap();
            logger
                .record(&record(LogLevel::Batch, timer.batch, "loss"))
                .unwrap();
            timer.on_batch_complete();
            logger.on_batch_end().unwrap();
        }
        logger.close().unwrap();

        // Batches 2 and 4 (1-based) are on the interval
        assert_eq!(
            read(logger.path()),
            "[BATCH][batch=1]: { \"metric\": \"loss\", }\n\
             [BATCH][batch=3]: { \"metric\": \"loss\", }\n"
        );
    }

    #[test]
    fn test_epoch_records_always_written_at_batch_level() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Batch);
        config.log_interval = 100;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();

        logger.record(&record(LogLevel::Epoch, 0, "epoch")).unwrap();
        logger.close().unwrap();

        assert!(read(logger.path()).contains("\"epoch\""));
    }

    #[test]
    fn test_lines_written_when_threshold_reached() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Fit);
        config.flush_interval = 3;
        config.buffer_size = 1;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let tracker = Arc::new(Tracker::default());
        logger.add_artifact_sink(tracker.clone());

        logger.record(&record(LogLevel::Fit, 0, "a")).unwrap();
        logger.record(&record(LogLevel::Fit, 0, "b")).unwrap();
        assert_eq!(logger.buffered_lines(), 2);
        assert_eq!(read(logger.path()), "");

        logger.record(&record(LogLevel::Fit, 0, "c")).unwrap();
        assert_eq!(logger.buffered_lines(), 0);
        assert_eq!(read(logger.path()).lines().count(), 3);

        // Threshold writes never notify sinks
        assert_eq!(tracker.count(), 0);
        logger.close().unwrap();
    }

    #[test]
    fn test_flush_notifies_sinks() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let mut logger = FileLogger::new(config, &RunContext::new("run", 0)).unwrap();
        let tracker = Arc::new(Tracker::default());
        logger.add_artifact_sink(tracker.clone());

        logger.record(&record(LogLevel::Fit, 0, "fit")).unwrap();
        logger.flush().unwrap();

        let logged = tracker.logged.lock().unwrap().clone();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].0, LogLevel::Epoch);
        assert_eq!(logged[0].1, "run/rank0.log");
        assert_eq!(logged[0].2, logger.path());
        assert_eq!(logger.buffered_lines(), 0);
        assert_eq!(read(logger.path()).lines().count(), 1);
    }

    #[test]
    fn test_empty_flush_notification_is_configurable() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Epoch);
        config.notify_on_empty_flush = false;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let tracker = Arc::new(Tracker::default());
        logger.add_artifact_sink(tracker.clone());

        logger.flush().unwrap();
        assert_eq!(tracker.count(), 0);

        logger.record(&record(LogLevel::Fit, 0, "fit")).unwrap();
        logger.flush().unwrap();
        logger.flush().unwrap();
        assert_eq!(tracker.count(), 1);
        assert_eq!(logger.flush_count(), 3);
    }

    #[test]
    fn test_no_notification_without_artifact_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir, LogLevel::Epoch);
        config.artifact_name = None;
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let tracker = Arc::new(Tracker::default());
        logger.add_artifact_sink(tracker.clone());

        logger.flush().unwrap();
        logger.close().unwrap();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_sink_failure_propagates() {
        struct Failing;

        impl ArtifactSink for Failing {
            fn log_file_artifact(
                &self,
                _level: LogLevel,
                _artifact_name: &str,
                _file_path: &Path,
                _overwrite: bool,
            ) -> anyhow::Result<()> {
                anyhow::bail!("bucket unavailable")
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        logger.add_artifact_sink(Arc::new(Failing));

        let err = logger.flush().unwrap_err();
        assert!(matches!(err, LoggerError::Artifact { .. }));
    }

    #[test]
    fn test_epoch_level_flush_triggers() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let timer = Timer::new();

        logger.on_batch_start(&timer).unwrap();
        logger.on_batch_end().unwrap();
        assert_eq!(logger.flush_count(), 0);

        logger.on_epoch_start(&timer).unwrap();
        logger.on_epoch_end().unwrap();
        logger.on_eval_start().unwrap();
        assert_eq!(logger.flush_count(), 3);
    }

    #[test]
    fn test_fit_level_skips_epoch_end_flush() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Fit);
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();

        logger.on_epoch_end().unwrap();
        logger.on_batch_end().unwrap();
        assert_eq!(logger.flush_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        let tracker = Arc::new(Tracker::default());
        logger.add_artifact_sink(tracker.clone());

        logger.close().unwrap();
        logger.close().unwrap();

        assert_eq!(logger.state(), LoggerState::Closed);
        assert_eq!(logger.flush_count(), 1);
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_use_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
        logger.close().unwrap();

        assert!(matches!(
            logger.record(&record(LogLevel::Fit, 0, "late")),
            Err(LoggerError::Closed)
        ));
        assert!(matches!(logger.flush(), Err(LoggerError::Closed)));
        assert!(matches!(
            logger.run_event(Event::EpochEnd, &Timer::new()),
            Err(LoggerError::Closed)
        ));
    }

    #[test]
    fn test_drop_flushes_pending_lines() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, LogLevel::Epoch);
        let path = {
            let mut logger = FileLogger::new(config, &RunContext::new("r", 0)).unwrap();
            logger.record(&record(LogLevel::Fit, 0, "kept")).unwrap();
            logger.path().to_path_buf()
        };

        assert!(read(&path).contains("kept"));
    }
}
