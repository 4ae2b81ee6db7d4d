//! Optimizer parameter groups as seen by monitoring callbacks
//!
//! Optimizer internals are out of scope; callbacks only need a name and the
//! learning rate of each parameter group.

use serde::{Deserialize, Serialize};

/// A parameter group's hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamGroup {
    pub lr: f64,
}

/// Anything that exposes named parameter groups
pub trait ParameterGroupSource {
    /// Name used in metric keys (e.g. `SGD`, `DecoupledAdamW`)
    fn name(&self) -> &str;

    /// Parameter groups in their stable order
    fn param_groups(&self) -> &[ParamGroup];
}

/// Minimal optimizer with a per-group base learning rate and a scale factor
///
/// Stands in for a real optimizer in the driver and in tests.
#[derive(Debug, Clone)]
pub struct Optimizer {
    name: String,
    base_lrs: Vec<f64>,
    groups: Vec<ParamGroup>,
}

impl Optimizer {
    pub fn new(name: impl Into<String>, base_lrs: Vec<f64>) -> Self {
        let groups = base_lrs.iter().map(|&lr| ParamGroup { lr }).collect();
        Self {
            name: name.into(),
            base_lrs,
            groups,
        }
    }

    /// Set every group's learning rate to `factor` times its base rate
    pub fn scale_lr(&mut self, factor: f64) {
        for (group, base) in self.groups.iter_mut().zip(&self.base_lrs) {
            group.lr = base * factor;
        }
    }
}

impl ParameterGroupSource for Optimizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_groups(&self) -> &[ParamGroup] {
        &self.groups
    }
}
