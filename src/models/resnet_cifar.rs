//! ResNet family adapted for CIFAR-10 image sizes

use std::fmt;
use std::str::FromStr;

use super::ModelMetadata;

/// CIFAR ResNet variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResNetCifar {
    ResNet9,
    ResNet20,
    ResNet56,
}

/// All variants, shallowest first
pub const RESNET_CIFAR_VARIANTS: [ResNetCifar; 3] =
    [ResNetCifar::ResNet9, ResNetCifar::ResNet20, ResNetCifar::ResNet56];

const TASK: &str = "Image Classification";
const DATASET: &str = "CIFAR10";
const METRIC: &str = "Top-1 Accuracy";

impl ResNetCifar {
    /// Registry key, e.g. `resnet56`
    pub fn key(&self) -> &'static str {
        match self {
            ResNetCifar::ResNet9 => "resnet9",
            ResNetCifar::ResNet20 => "resnet20",
            ResNetCifar::ResNet56 => "resnet56",
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        match self {
            ResNetCifar::ResNet9 => ModelMetadata {
                task: TASK,
                dataset: DATASET,
                name: "ResNet9",
                quality: None,
                metric: METRIC,
                time_to_train: None,
                hparams: "resnet9_cifar10.yaml",
            },
            ResNetCifar::ResNet20 => ModelMetadata {
                task: TASK,
                dataset: DATASET,
                name: "ResNet20",
                quality: None,
                metric: METRIC,
                time_to_train: None,
                hparams: "resnet20_cifar10.yaml",
            },
            ResNetCifar::ResNet56 => ModelMetadata {
                task: TASK,
                dataset: DATASET,
                name: "ResNet56",
                quality: Some(93.1),
                metric: METRIC,
                time_to_train: Some("35m"),
                hparams: "resnet56_cifar10.yaml",
            },
        }
    }

    /// Look up metadata by registry key
    pub fn lookup(key: &str) -> Option<ModelMetadata> {
        key.parse::<Self>().ok().map(|variant| variant.metadata())
    }
}

impl fmt::Display for ResNetCifar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ResNetCifar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RESNET_CIFAR_VARIANTS
            .iter()
            .copied()
            .find(|v| v.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown CIFAR ResNet variant '{}'", s))
    }
}
