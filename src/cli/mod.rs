//! CLI module for mlops-model
//!
//! Subcommands:
//! - `train`: train and persist a model locally
//! - `train-tracked`: train and log the run to the tracking server
//! - `predict`: score features with a local or registered model
//! - `info`: describe a local or registered model
//! - `sample-data`: write a synthetic train/test dataset

pub mod predict;
pub mod sample_data;
pub mod train;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// mlops-model - Train, track and serve a tabular classifier
#[derive(Parser)]
#[command(name = "mlops-model")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Train a model and save it under the model directory
    Train(train::TrainArgs),

    /// Train a model and log it to the tracking server
    TrainTracked(train::TrainArgs),

    /// Predict with a local or registered model
    Predict(predict::PredictArgs),

    /// Show information about a local or registered model
    Info(predict::InfoArgs),

    /// Generate the synthetic sample dataset
    SampleData(sample_data::SampleDataArgs),
}

/// Load `.env` and configuration, then start logging
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Invalid configuration, using defaults: {}", e);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    });

    logging::init_logging(&config.logging);
    config
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
