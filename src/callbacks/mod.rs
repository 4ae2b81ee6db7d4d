//! Training callbacks
//!
//! Callbacks observe lifecycle events and report through the [`Logger`] facade.

mod lr_monitor;

pub use lr_monitor::LrMonitor;

use crate::error::LoggerResult;
use crate::logging::Logger;
use crate::state::{Event, State};

/// Hook run by the training loop on every lifecycle event
pub trait Callback {
    fn run_event(&mut self, event: Event, state: &State, logger: &mut Logger) -> LoggerResult<()>;
}
