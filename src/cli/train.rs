//! Training commands

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use super::{bootstrap, print_json};
use crate::config::ModelConfig;
use crate::infrastructure::services::{run_local_pipeline, run_tracked_pipeline, ModelTrainer};

/// Arguments shared by the training commands
#[derive(Args, Clone)]
pub struct TrainArgs {
    /// Training CSV (overrides config)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Model configuration YAML (overrides config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for artifacts (overrides config)
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}

/// Train and persist locally
pub async fn run_local(args: TrainArgs) -> anyhow::Result<()> {
    let config = bootstrap();
    let model_config = ModelConfig::load(args.config.unwrap_or(config.model.config_path))?;
    let data = args.data.unwrap_or(config.model.data_path);
    let model_dir = args.model_dir.unwrap_or(config.model.model_dir);

    let mut trainer = ModelTrainer::new().with_model_name(&config.model.name);
    let summary = tokio::task::spawn_blocking(move || {
        run_local_pipeline(&mut trainer, model_config, data, model_dir)
    })
    .await??;

    info!(
        version = %summary.version,
        accuracy = summary.metrics.get("accuracy").copied().unwrap_or_default(),
        "Model trained successfully"
    );
    print_json(&summary)
}

/// Train and log to the tracking server
pub async fn run_tracked(args: TrainArgs) -> anyhow::Result<()> {
    let config = bootstrap();
    let model_config =
        ModelConfig::load(args.config.unwrap_or_else(|| config.model.config_path.clone()))?;
    let data = args.data.unwrap_or_else(|| config.model.data_path.clone());
    let artifacts_dir = args
        .model_dir
        .unwrap_or_else(|| config.model.model_dir.clone());

    let mut trainer = crate::create_tracked_trainer(&config).await?;
    let summary =
        run_tracked_pipeline(&mut trainer, model_config, data, Some(&artifacts_dir)).await?;

    info!(version = %summary.version, run_id = %summary.run_id, "Tracked training finished");
    print_json(&summary)
}
