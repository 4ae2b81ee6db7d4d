//! Configuration for the file logger and the training-run driver

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{LoggerError, LoggerResult};
use crate::logging::LogLevel;

/// File logger configuration
///
/// `filename` and `artifact_name` may contain `{run_name}` and `{rank}`
/// placeholders and a leading `~`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileLoggerConfig {
    /// Path template of the log file
    #[serde(default = "default_filename")]
    pub filename: String,

    /// Artifact name template reported to artifact sinks on flush (none = no notifications)
    #[serde(default)]
    pub artifact_name: Option<String>,

    /// Most verbose level that is written
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Write records at the configured level only every N batches/epochs
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,

    /// Byte capacity of the file writer's buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Number of buffered lines that forces a write to the file
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// Mirror everything written to stdout into the log file
    #[serde(default)]
    pub capture_stdout: bool,

    /// Mirror everything written to stderr into the log file
    #[serde(default)]
    pub capture_stderr: bool,

    /// Replace an existing log file instead of refusing to start
    #[serde(default)]
    pub overwrite: bool,

    /// Notify artifact sinks on flushes that wrote no new lines
    #[serde(default = "default_notify_on_empty_flush")]
    pub notify_on_empty_flush: bool,
}

fn default_filename() -> String {
    "{run_name}/logs-rank{rank}.txt".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Epoch
}

fn default_log_interval() -> u64 {
    1
}

fn default_buffer_size() -> usize {
    8 * 1024
}

fn default_flush_interval() -> usize {
    100
}

fn default_notify_on_empty_flush() -> bool {
    true
}

impl Default for FileLoggerConfig {
    fn default() -> Self {
        Self {
            filename: default_filename(),
            artifact_name: None,
            log_level: default_log_level(),
            log_interval: default_log_interval(),
            buffer_size: default_buffer_size(),
            flush_interval: default_flush_interval(),
            capture_stdout: false,
            capture_stderr: false,
            overwrite: false,
            notify_on_empty_flush: default_notify_on_empty_flush(),
        }
    }
}

impl FileLoggerConfig {
    /// Create a config writing to `filename` with default settings
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Check thresholds and paths
    pub fn validate(&self) -> LoggerResult<()> {
        if self.filename.trim().is_empty() {
            return Err(LoggerError::Configuration(
                "filename must not be empty".to_string(),
            ));
        }
        if self.log_interval < 1 {
            return Err(LoggerError::Configuration(
                "log_interval must be at least 1".to_string(),
            ));
        }
        if self.flush_interval < 1 {
            return Err(LoggerError::Configuration(
                "flush_interval must be at least 1".to_string(),
            ));
        }
        if self.buffer_size < 1 {
            return Err(LoggerError::Configuration(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        if matches!(&self.artifact_name, Some(name) if name.trim().is_empty()) {
            return Err(LoggerError::Configuration(
                "artifact_name must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity of the current run, used to fill path templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_name: String,
    pub rank: usize,
}

impl RunContext {
    pub fn new(run_name: impl Into<String>, rank: usize) -> Self {
        Self {
            run_name: run_name.into(),
            rank,
        }
    }

    /// Fill `{run_name}` and `{rank}` and expand a leading `~`
    pub fn resolve(&self, template: &str) -> String {
        let filled = template
            .replace("{run_name}", &self.run_name)
            .replace("{rank}", &self.rank.to_string());
        shellexpand::tilde(&filled).into_owned()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(default_run_name(), 0)
    }
}

/// Generate a timestamped run name
pub fn default_run_name() -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("run-{}", timestamp)
}

/// Optimizer entry of the driver config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerConfig {
    pub name: String,
    /// Base learning rate of each parameter group
    pub lrs: Vec<f64>,
}

/// Simulated run settings of the driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Run name (default: timestamped)
    #[serde(default)]
    pub run_name: Option<String>,

    #[serde(default)]
    pub rank: usize,

    /// Model variant whose metadata is logged at FIT level
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_epochs")]
    pub epochs: u64,

    #[serde(default = "default_batches_per_epoch")]
    pub batches_per_epoch: u64,

    /// Run an evaluation pass every N epochs (0 = never)
    #[serde(default = "default_eval_interval")]
    pub eval_interval: u64,

    /// Mirror records into the process log
    #[serde(default)]
    pub trace_records: bool,

    /// Copy flushed log files into this directory
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

fn default_model() -> String {
    "resnet56".to_string()
}

fn default_epochs() -> u64 {
    3
}

fn default_batches_per_epoch() -> u64 {
    10
}

fn default_eval_interval() -> u64 {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_name: None,
            rank: 0,
            model: default_model(),
            epochs: default_epochs(),
            batches_per_epoch: default_batches_per_epoch(),
            eval_interval: default_eval_interval(),
            trace_records: false,
            artifacts_dir: None,
        }
    }
}

/// Driver configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainlogConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub logger: FileLoggerConfig,

    #[serde(default = "default_optimizers")]
    pub optimizers: Vec<OptimizerConfig>,
}

fn default_optimizers() -> Vec<OptimizerConfig> {
    vec![OptimizerConfig {
        name: "SGD".to_string(),
        lrs: vec![0.1],
    }]
}

impl Default for TrainlogConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            logger: FileLoggerConfig::default(),
            optimizers: default_optimizers(),
        }
    }
}

impl TrainlogConfig {
    /// Load configuration from `path`, or return defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.logger.validate()?;
        if self.run.batches_per_epoch == 0 {
            anyhow::bail!("batches_per_epoch must be at least 1");
        }
        if self.optimizers.iter().any(|o| o.lrs.is_empty()) {
            anyhow::bail!("every optimizer needs at least one learning rate");
        }
        Ok(())
    }

    /// Build the run identity, generating a name if none is configured
    pub fn run_context(&self) -> RunContext {
        RunContext::new(
            self.run.run_name.clone().unwrap_or_else(default_run_name),
            self.run.rank,
        )
    }
}

/// Get the base configuration directory (~/.trainlog)
/// Falls back to ./.trainlog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".trainlog"))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine home directory, using current directory for config");
            PathBuf::from(".trainlog")
        })
}

/// Get the path to the default config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
