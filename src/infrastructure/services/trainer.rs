//! Model lifecycle controller: configure, train, evaluate, persist and log

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ModelConfig, DEFAULT_MODEL_NAME};
use crate::domain::data_access::TEST_DATASET;
use crate::domain::metrics::evaluate_classifier;
use crate::domain::{
    ArtifactMap, Classifier, DataAccess, DomainError, EvaluationReport, Label, MetricMap,
    ModelArtifact, ModelRecord, ParamMap, Table, TrackingClient,
};
use crate::infrastructure::classifier::{ForestParams, RandomForestClassifier};
use crate::infrastructure::store::{LocalArtifactStore, MetadataDraft, PersistedModel};

/// File name of the model written to the remote artifacts directory
const REMOTE_MODEL_FILE: &str = "model.json";

/// Artifact key of the locally written model file attached to a run
const MODEL_FILE_ARTIFACT: &str = "model_file";

/// Lifecycle position of a trainer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Uninitialized,
    Configured,
    Trained,
    Evaluated,
    Persisted,
}

impl TrainerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Trained => "trained",
            Self::Evaluated => "evaluated",
            Self::Persisted => "persisted",
        }
    }
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a best-effort database mirror
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatabaseOutcome {
    /// No database configured
    Skipped,
    Saved,
    Failed { error: String },
}

impl DatabaseOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Model fitted by this trainer and the inputs that produced it
#[derive(Debug)]
struct TrainedModel {
    model: Arc<dyn Classifier>,
    parameters: ParamMap,
    trained_at: DateTime<Utc>,
}

/// Drives one model through the training lifecycle
#[derive(Debug)]
pub struct ModelTrainer {
    tracking: Option<Arc<dyn TrackingClient>>,
    data_access: Option<Arc<dyn DataAccess>>,
    model_name: String,
    state: TrainerState,
    config: ModelConfig,
    trained: Option<TrainedModel>,
    report: Option<EvaluationReport>,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTrainer {
    pub fn new() -> Self {
        Self {
            tracking: None,
            data_access: None,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            state: TrainerState::Uninitialized,
            config: ModelConfig::default(),
            trained: None,
            report: None,
        }
    }

    pub fn with_tracking(mut self, tracking: Arc<dyn TrackingClient>) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn with_data_access(mut self, data_access: Arc<dyn DataAccess>) -> Self {
        self.data_access = Some(data_access);
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&Arc<dyn Classifier>> {
        self.trained.as_ref().map(|t| &t.model)
    }

    /// Effective hyperparameters of the trained model
    pub fn parameters(&self) -> Option<&ParamMap> {
        self.trained.as_ref().map(|t| &t.parameters)
    }

    pub fn report(&self) -> Option<&EvaluationReport> {
        self.report.as_ref()
    }

    /// Flat metric mapping of the last evaluation, empty before evaluating
    pub fn metrics(&self) -> MetricMap {
        self.report.as_ref().map(EvaluationReport::metrics).unwrap_or_default()
    }

    fn require(&self, expected: TrainerState) -> Result<(), DomainError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DomainError::invalid_state(expected.name(), self.state.name()))
        }
    }

    fn require_evaluated(&self) -> Result<&TrainedModel, DomainError> {
        match (self.state, self.trained.as_ref()) {
            (TrainerState::Evaluated | TrainerState::Persisted, Some(trained)) => Ok(trained),
            _ => Err(DomainError::invalid_state(
                "evaluated or persisted",
                self.state.name(),
            )),
        }
    }

    /// Validate and adopt a configuration, starting a new sequence
    pub fn configure(&mut self, config: ModelConfig) -> Result<(), DomainError> {
        config.validate()?;
        ForestParams::from_map(&config.model_params)?;

        self.config = config;
        self.trained = None;
        self.report = None;
        self.state = TrainerState::Configured;
        Ok(())
    }

    /// Resolve the parameters for a training call.
    ///
    /// Explicit params win over the configured ones; when both are empty the
    /// fixed fallback applies.
    fn resolve_params(&self, params: Option<&ParamMap>) -> Result<ForestParams, DomainError> {
        let chosen = params
            .filter(|p| !p.is_empty())
            .or(Some(&self.config.model_params).filter(|p| !p.is_empty()));

        match chosen {
            Some(map) => ForestParams::from_map(map),
            None => Ok(ForestParams::default()),
        }
    }

    /// Fit a random forest on the training split
    pub fn train(
        &mut self,
        x_train: &Table,
        y_train: &[Label],
        params: Option<&ParamMap>,
    ) -> Result<(), DomainError> {
        self.require(TrainerState::Configured)?;

        let params = self.resolve_params(params)?;
        let parameters = params.to_map();

        info!(
            n_estimators = params.n_estimators,
            max_depth = ?params.max_depth,
            random_state = params.random_state,
            rows = x_train.len(),
            "Training model"
        );

        let model = RandomForestClassifier::fit(x_train, y_train, params)?;
        self.install(Arc::new(model), parameters);

        info!("Model training completed");
        Ok(())
    }

    fn install(&mut self, model: Arc<dyn Classifier>, parameters: ParamMap) {
        self.trained = Some(TrainedModel {
            model,
            parameters,
            trained_at: Utc::now(),
        });
        self.state = TrainerState::Trained;
    }

    /// Score the trained model on the held-out split
    pub fn evaluate(
        &mut self,
        x_test: &Table,
        y_test: &[Label],
    ) -> Result<EvaluationReport, DomainError> {
        self.require(TrainerState::Trained)?;
        let trained = self
            .trained
            .as_ref()
            .ok_or_else(|| DomainError::invalid_state("trained", self.state.name()))?;

        let report = evaluate_classifier(trained.model.as_ref(), x_test, y_test)?;

        for (metric, value) in report.metrics() {
            info!(metric = %metric, value = %format!("{:.4}", value), "Evaluation metric");
        }
        if report.roc_auc.value().is_none() {
            info!(roc_auc = ?report.roc_auc, "ROC-AUC not computed");
        }

        self.report = Some(report.clone());
        self.state = TrainerState::Evaluated;
        Ok(report)
    }

    /// Save the evaluated model as a new version and as latest under `dir`
    pub fn persist_local(&mut self, dir: impl AsRef<Path>) -> Result<PersistedModel, DomainError> {
        self.require(TrainerState::Evaluated)?;
        let trained = self
            .trained
            .as_ref()
            .ok_or_else(|| DomainError::invalid_state("evaluated", self.state.name()))?;

        let draft = MetadataDraft {
            training_date: trained.trained_at,
            metrics: self.metrics(),
            parameters: trained.parameters.clone(),
            features: trained.model.feature_names().to_vec(),
            target: self.config.target.clone(),
        };

        let persisted = LocalArtifactStore::new(dir.as_ref()).persist(trained.model.as_ref(), draft)?;

        self.state = TrainerState::Persisted;
        Ok(persisted)
    }

    /// Record the evaluated model as a tracking run, returning its id
    pub async fn log_remote(
        &self,
        params: &ParamMap,
        artifacts_dir: Option<&Path>,
    ) -> Result<String, DomainError> {
        let trained = self.require_evaluated()?;
        let tracking = self
            .tracking
            .as_ref()
            .ok_or_else(|| DomainError::tracking("Tracking client not initialized"))?;

        let mut artifacts = ArtifactMap::new();
        if let Some(dir) = artifacts_dir {
            let path = write_model_file(trained.model.as_ref(), dir).await?;
            artifacts.insert(MODEL_FILE_ARTIFACT.to_string(), path);
        }

        let run_id = tracking
            .log_model_training(trained.model.as_ref(), &self.metrics(), params, &artifacts)
            .await?;

        info!(run_id = %run_id, "Training logged to tracking service");
        Ok(run_id)
    }

    /// Mirror the model's metadata row; failures never propagate
    pub async fn save_to_database(
        &self,
        model_version: &str,
        run_id: &str,
        params: &ParamMap,
    ) -> Result<DatabaseOutcome, DomainError> {
        self.require_evaluated()?;

        let Some(data_access) = self.data_access.as_ref() else {
            warn!("Database not configured, skipping metadata save");
            return Ok(DatabaseOutcome::Skipped);
        };

        let record = ModelRecord {
            model_name: self.model_name.clone(),
            model_version: model_version.to_string(),
            model_run_id: run_id.to_string(),
            training_date: Utc::now(),
            metrics: self.metrics(),
            parameters: params.clone(),
            is_production: false,
        };

        Ok(match data_access.save_model_metadata(&record).await {
            Ok(()) => {
                info!(model_version, "Model metadata saved to database");
                DatabaseOutcome::Saved
            }
            Err(e) => {
                warn!(model_version, error = %e, "Failed to save model metadata");
                DatabaseOutcome::Failed {
                    error: e.to_string(),
                }
            }
        })
    }

    /// Mirror each evaluation metric as a test-set measurement
    pub async fn save_performance_metrics(
        &self,
        model_version: &str,
    ) -> Result<DatabaseOutcome, DomainError> {
        self.require_evaluated()?;

        let Some(data_access) = self.data_access.as_ref() else {
            return Ok(DatabaseOutcome::Skipped);
        };

        let mut first_error = None;
        for (name, value) in self.metrics() {
            if let Err(e) = data_access
                .log_performance_metric(model_version, &name, value, TEST_DATASET)
                .await
            {
                warn!(model_version, metric = %name, error = %e, "Failed to log metric");
                first_error.get_or_insert(e.to_string());
            }
        }

        Ok(match first_error {
            None => DatabaseOutcome::Saved,
            Some(error) => DatabaseOutcome::Failed { error },
        })
    }

    /// Release the database connection, if any
    pub async fn cleanup(&self) {
        if let Some(data_access) = self.data_access.as_ref() {
            data_access.close().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn install_model(&mut self, model: Arc<dyn Classifier>) -> Result<(), DomainError> {
        self.require(TrainerState::Configured)?;
        self.install(model, ParamMap::new());
        Ok(())
    }
}

async fn write_model_file(
    model: &dyn Classifier,
    dir: &Path,
) -> Result<std::path::PathBuf, DomainError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        DomainError::tracking(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(REMOTE_MODEL_FILE);
    let bytes = ModelArtifact::from_classifier(model, None)?.to_bytes()?;
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        DomainError::tracking(format!("Failed to write {}: {}", path.display(), e))
    })?;

    Ok(path)
}
