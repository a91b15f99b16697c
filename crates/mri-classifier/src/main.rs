mod backend;
mod config;
mod corpus;
mod data;
mod error;
mod infer;
mod model;
mod server;
mod service;
mod train;

use crate::backend::{ServeBackend, TrainBackend};
use crate::config::ServiceConfig;
use crate::corpus::SampleCorpus;
use crate::infer::Classifier;
use crate::service::PredictionService;
use crate::train::TrainingConfig;
use burn::prelude::Backend;
use simple_logger::SimpleLogger;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Usage: mri-classifier [serve|train] [CONFIG_JSON]
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (command, config_path) = match args.next() {
        Some(command) if command == "serve" || command == "train" => (command, args.next()),
        other => ("serve".to_string(), other),
    };

    let config = ServiceConfig::from_file(config_path.as_deref())?;
    SimpleLogger::new()
        .with_level(config.log_level())
        .env()
        .init()?;

    log::info!("mri-classifier version: {}", env!("CARGO_PKG_VERSION"));
    log::info!("Burn backend: {}", ServeBackend::name());

    match command.as_str() {
        "train" => train(&config),
        _ => serve(config),
    }
}

fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let classifier = match Classifier::<ServeBackend>::load(&config.model_path, backend::device()) {
        Ok(classifier) => Some(classifier),
        Err(err) => {
            // keep serving; every prediction will come back empty
            log::error!("Error loading model: {err}");
            None
        }
    };

    let service = Arc::new(PredictionService::new(
        classifier,
        SampleCorpus::new(&config.corpus_dir),
        config.static_route.clone(),
    ));

    tokio::runtime::Runtime::new()?.block_on(server::serve(service, &config.bind_address))
}

fn train(config: &ServiceConfig) -> anyhow::Result<()> {
    let time = SystemTime::now();
    log::info!("Training on {}, artifacts in {}", config.corpus_dir, config.artifact_dir().display());

    train::train_run::<TrainBackend>(
        &TrainingConfig::standard(),
        Path::new(&config.corpus_dir),
        Path::new(&config.model_path),
        backend::device(),
    )?;

    log::info!("Time to train: {}", time.elapsed()?.as_millis() as f64 / 1000.0);
    Ok(())
}
