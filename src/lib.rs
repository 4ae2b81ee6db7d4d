//! trainlog - logging glue for deep-learning training runs
//!
//! This library provides a buffered, level-gated file logger with optional
//! stdout/stderr capture, a logging facade, a learning-rate monitor callback
//! and model-family metadata.

pub mod artifacts;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod optim;
pub mod state;
