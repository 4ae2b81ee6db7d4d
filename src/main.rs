use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use trainlog::artifacts::LocalArtifactStore;
use trainlog::callbacks::{Callback, LrMonitor};
use trainlog::config::{self, TrainlogConfig};
use trainlog::logging::{self, FileLogger, LogLevel, Logger, TracingDestination};
use trainlog::models::ResNetCifar;
use trainlog::optim::{Optimizer, ParameterGroupSource};
use trainlog::state::{Event, State};

fn main() -> Result<()> {
    logging::init_tracing("trainlog=info")?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_file_path);
    let config = TrainlogConfig::load(&config_path)?;
    let run = config.run_context();
    tracing::info!("Starting run {} (rank {})", run.run_name, run.rank);

    let mut file_logger =
        FileLogger::new(config.logger.clone(), &run).context("Failed to start file logger")?;
    let store = config
        .run
        .artifacts_dir
        .as_ref()
        .map(|dir| Arc::new(LocalArtifactStore::new(dir)));
    if let Some(store) = &store {
        file_logger.add_artifact_sink(store.clone());
    }
    let log_path = file_logger.path().to_path_buf();

    let mut logger = Logger::new(vec![Box::new(file_logger)]);
    if config.run.trace_records {
        logger.add_destination(Box::new(TracingDestination::new(config.logger.log_level)));
    }

    let result = simulate(&config, &mut logger);
    let closed = logger.close();
    result?;
    closed?;

    tracing::info!("Run log written to {}", log_path.display());
    if let Some(store) = &store {
        tracing::info!(
            "{} log artifacts stored under {}",
            store.notification_count(),
            store.root().display()
        );
    }
    Ok(())
}

/// Walk a simulated training run, driving the logger and callbacks
fn simulate(config: &TrainlogConfig, logger: &mut Logger) -> Result<()> {
    let mut optimizers: Vec<Optimizer> = config
        .optimizers
        .iter()
        .map(|o| Optimizer::new(o.name.clone(), o.lrs.clone()))
        .collect();
    let mut state = State::new(Vec::new());
    let mut callbacks: Vec<Box<dyn Callback>> = vec![Box::new(LrMonitor::new())];

    let total_batches = config.run.epochs * config.run.batches_per_epoch;

    emit(Event::Init, &state, logger, &mut callbacks)?;
    match ResNetCifar::lookup(&config.run.model) {
        Some(metadata) => logger.data_fit(state.timer.batch, &metadata)?,
        None => tracing::warn!("Unknown model '{}', skipping metadata", config.run.model),
    }

    for epoch in 0..config.run.epochs {
        emit(Event::EpochStart, &state, logger, &mut callbacks)?;

        for _ in 0..config.run.batches_per_epoch {
            // Linear decay over the whole run
            let progress = state.timer.batch as f64 / total_batches.max(1) as f64;
            for optimizer in optimizers.iter_mut() {
                optimizer.scale_lr(1.0 - progress);
            }
            state.optimizers = optimizers
                .iter()
                .cloned()
                .map(|o| Box::new(o) as Box<dyn ParameterGroupSource>)
                .collect();

            emit(Event::BatchStart, &state, logger, &mut callbacks)?;
            let loss = 2.3 * (-(state.timer.batch as f64) / 20.0).exp();
            logger.data_batch(state.timer.batch, &json!({ "loss/train": loss }))?;
            state.timer.on_batch_complete();
            emit(Event::BatchEnd, &state, logger, &mut callbacks)?;
        }

        state.timer.on_epoch_complete();
        logger.data_epoch(state.timer.batch, &json!({ "epoch": epoch + 1 }))?;
        emit(Event::EpochEnd, &state, logger, &mut callbacks)?;

        if config.run.eval_interval > 0 && (epoch + 1) % config.run.eval_interval == 0 {
            emit(Event::EvalStart, &state, logger, &mut callbacks)?;
            let accuracy = 1.0 - 0.9 * (-(state.timer.epoch as f64) / 2.0).exp();
            logger.log_data(
                LogLevel::Epoch,
                state.timer.batch,
                &json!({ "accuracy/val": accuracy }),
            )?;
        }
    }

    Ok(())
}

/// Deliver an event to the logger destinations, then to the callbacks
fn emit(
    event: Event,
    state: &State,
    logger: &mut Logger,
    callbacks: &mut [Box<dyn Callback>],
) -> Result<()> {
    logger.run_event(event, &state.timer)?;
    for callback in callbacks.iter_mut() {
        callback.run_event(event, state, logger)?;
    }
    Ok(())
}
