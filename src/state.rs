//! Training-run state seen by loggers and callbacks
//!
//! The training loop itself lives outside this crate; these types are the
//! surface it drives: a progress [`Timer`], the lifecycle [`Event`]s, and the
//! [`State`] handed to callbacks.

use std::fmt;

use crate::optim::ParameterGroupSource;

/// Lifecycle events emitted by the training loop, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Init,
    EpochStart,
    BatchStart,
    BatchEnd,
    EpochEnd,
    EvalStart,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Init => "init",
            Event::EpochStart => "epoch_start",
            Event::BatchStart => "batch_start",
            Event::BatchEnd => "batch_end",
            Event::EpochEnd => "epoch_end",
            Event::EvalStart => "eval_start",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic progress counters
///
/// `batch` counts completed batches over the whole run, `epoch` completed
/// epochs. Both only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    pub epoch: u64,
    pub batch: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed batch
    pub fn on_batch_complete(&mut self) {
        self.batch += 1;
    }

    /// Record a completed epoch
    pub fn on_epoch_complete(&mut self) {
        self.epoch += 1;
    }
}

/// State handed to callbacks on every event
#[derive(Default)]
pub struct State {
    pub timer: Timer,
    pub optimizers: Vec<Box<dyn ParameterGroupSource>>,
}

impl State {
    pub fn new(optimizers: Vec<Box<dyn ParameterGroupSource>>) -> Self {
        Self {
            timer: Timer::new(),
            optimizers,
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("timer", &self.timer)
            .field(
                "optimizers",
                &self.optimizers.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_counts() {
        let mut timer = Timer::new();
        timer.on_batch_complete();
        timer.on_batch_complete();
        assert_eq!(timer.batch, 2);

        timer.on_epoch_complete();
        assert_eq!(timer.epoch, 1);
        assert_eq!(timer.batch, 2);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::BatchEnd.to_string(), "batch_end");
        assert_eq!(Event::EvalStart.as_str(), "eval_start");
    }
}
