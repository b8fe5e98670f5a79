//! Prediction and model info commands

use std::path::PathBuf;

use clap::Args;

use super::{bootstrap, print_json};
use crate::domain::FeatureRecord;
use crate::infrastructure::data::load_csv;
use crate::infrastructure::services::ModelPredictor;

/// Which model to serve
#[derive(Args, Clone)]
pub struct ModelSelection {
    /// Registered model version; defaults to the Production stage
    #[arg(long)]
    pub version: Option<String>,

    /// Serve the latest model saved in this directory instead of the registry
    #[arg(long, conflicts_with = "version")]
    pub local: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub model: ModelSelection,

    /// Feature record as a JSON object, e.g. '{"feature1": 0.5}'
    #[arg(long, conflicts_with = "input", required_unless_present = "input")]
    pub features: Option<String>,

    /// CSV of feature rows to score
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct InfoArgs {
    #[command(flatten)]
    pub model: ModelSelection,
}

async fn load(selection: &ModelSelection) -> anyhow::Result<ModelPredictor> {
    let config = bootstrap();

    let predictor = match &selection.local {
        Some(dir) => {
            let predictor = ModelPredictor::new(None).with_model_name(&config.model.name);
            predictor.load_latest_local(dir).await?;
            predictor
        }
        None => {
            let predictor = crate::create_predictor(&config)?;
            match &selection.version {
                Some(version) => predictor.load_version(version).await?,
                None => {
                    predictor.load_production().await?;
                }
            }
            predictor
        }
    };

    Ok(predictor)
}

pub async fn run(args: PredictArgs) -> anyhow::Result<()> {
    let predictor = load(&args.model).await?;

    let result = match (&args.features, &args.input) {
        (Some(json), _) => {
            let features: FeatureRecord = serde_json::from_str(json)?;
            predictor.predict(&features, None).await?
        }
        (None, Some(path)) => predictor.predict_batch(&load_csv(path)?, None).await?,
        (None, None) => anyhow::bail!("Either --features or --input is required"),
    };

    print_json(&result)
}

pub async fn info(args: InfoArgs) -> anyhow::Result<()> {
    let predictor = load(&args.model).await?;
    print_json(&predictor.get_model_info().await?)
}
