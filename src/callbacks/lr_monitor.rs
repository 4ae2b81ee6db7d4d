//! Learning-rate monitoring

use serde_json::{Map, Value};

use super::Callback;
use crate::error::LoggerResult;
use crate::logging::{LogLevel, LogRecord, Logger};
use crate::optim::ParameterGroupSource;
use crate::state::{Event, State};

/// Logs the learning rate of every optimizer parameter group after each batch
///
/// Each group gets its own BATCH-level record under the key
/// `lr-<OptimizerName>/group<Index>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LrMonitor;

impl LrMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Metric key for a parameter group
    pub fn key(optimizer_name: &str, group: usize) -> String {
        format!("lr-{}/group{}", optimizer_name, group)
    }

    /// Log one record per parameter group of every optimizer
    pub fn batch_end(
        &self,
        optimizers: &[Box<dyn ParameterGroupSource>],
        step: u64,
        logger: &mut Logger,
    ) -> LoggerResult<()> {
        for optimizer in optimizers {
            let name = optimizer.name();
            for (index, group) in optimizer.param_groups().iter().enumerate() {
                let mut payload = Map::new();
                payload.insert(Self::key(name, index), Value::from(group.lr));
                logger.log_record(&LogRecord::from_map(LogLevel::Batch, step, payload))?;
            }
        }
        Ok(())
    }
}

impl Callback for LrMonitor {
    fn run_event(&mut self, event: Event, state: &State, logger: &mut Logger) -> LoggerResult<()> {
        match event {
            Event::BatchEnd => self.batch_end(&state.optimizers, state.timer.batch, logger),
            _ => Ok(()),
        }
    }
}
