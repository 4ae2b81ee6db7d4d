//! Model family metadata
//!
//! Architectures live with the training framework; this crate only carries
//! the model-card metadata used for logging and lookup.

mod resnet_cifar;

pub use resnet_cifar::{ResNetCifar, RESNET_CIFAR_VARIANTS};

use serde::Serialize;

/// Model-card metadata for a model variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub task: &'static str,
    pub dataset: &'static str,
    pub name: &'static str,
    /// Reported quality on `metric`, when benchmarked
    pub quality: Option<f64>,
    pub metric: &'static str,
    /// Time to train, when benchmarked
    pub time_to_train: Option<&'static str>,
    /// Hyperparameter file for the reference recipe
    pub hparams: &'static str,
}
