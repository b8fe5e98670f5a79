//! mlops-model
//!
//! Lifecycle of a tabular classifier:
//! - training and evaluation of a random forest
//! - versioned local persistence with a latest pointer
//! - logging runs to an MLflow-compatible tracking server
//! - mirroring metadata into PostgreSQL
//! - serving predictions from a loaded model

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use domain::{DataAccess, TrackingClient};
use infrastructure::database::PostgresDataAccess;
use infrastructure::services::{ModelPredictor, ModelTrainer};
use infrastructure::tracking::MlflowTrackingClient;

/// Create the tracking client described by `config`
pub fn create_tracking_client(config: &AppConfig) -> anyhow::Result<Arc<dyn TrackingClient>> {
    let client = MlflowTrackingClient::new(
        &config.tracking.uri,
        &config.model.name,
        Duration::from_secs(config.tracking.timeout_secs),
    )?
    .with_experiment_id(&config.tracking.experiment_id);

    info!(uri = %config.tracking.uri, "Tracking client configured");
    Ok(Arc::new(client))
}

/// Connect the metadata database, if one is configured.
///
/// A failed connection disables the database rather than failing the caller.
pub async fn create_data_access(config: &AppConfig) -> Option<Arc<dyn DataAccess>> {
    let url = config.database.url.as_deref()?;

    match PostgresDataAccess::connect(url).await {
        Ok(data_access) => Some(Arc::new(data_access)),
        Err(e) => {
            warn!(error = %e, "Metadata database unavailable, continuing without it");
            None
        }
    }
}

/// Trainer wired with the tracking client and, when available, the database
pub async fn create_tracked_trainer(config: &AppConfig) -> anyhow::Result<ModelTrainer> {
    let mut trainer = ModelTrainer::new()
        .with_model_name(&config.model.name)
        .with_tracking(create_tracking_client(config)?);

    if let Some(data_access) = create_data_access(config).await {
        trainer = trainer.with_data_access(data_access);
    }

    Ok(trainer)
}

/// Predictor backed by the configured tracking server
pub fn create_predictor(config: &AppConfig) -> anyhow::Result<ModelPredictor> {
    Ok(ModelPredictor::new(Some(create_tracking_client(config)?)).with_model_name(&config.model.name))
}
