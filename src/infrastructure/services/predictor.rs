//! Serving façade over a single loaded model

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::DEFAULT_MODEL_NAME;
use crate::domain::metadata::{TRAINING_DATE_TAG, UNKNOWN_TRAINING_DATE};
use crate::domain::{
    Classifier, DomainError, FeatureRecord, Label, ModelInfo, ModelMetadata, Table, TrackedModel,
    TrackingClient,
};
use crate::infrastructure::store::LocalArtifactStore;

/// Labels predicted by the served model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction: Vec<Label>,
    pub model_version: String,
    pub model_run_id: Option<String>,
    /// Highest class probability, absent without probability support
    pub confidence: Option<f64>,
}

/// Where the loaded model's description came from
#[derive(Debug, Clone)]
enum ModelSource {
    Tracked(TrackedModel),
    Local(ModelMetadata),
}

#[derive(Debug, Clone)]
struct LoadedModel {
    version: String,
    run_id: Option<String>,
    model: Arc<dyn Classifier>,
    source: ModelSource,
}

#[derive(Debug, Default)]
enum ServingState {
    #[default]
    Unloaded,
    Loaded(LoadedModel),
}

impl ServingState {
    fn loaded(&self) -> Result<&LoadedModel, DomainError> {
        match self {
            Self::Loaded(model) => Ok(model),
            Self::Unloaded => Err(DomainError::not_loaded("Model not loaded")),
        }
    }

    fn version(&self) -> Option<&str> {
        match self {
            Self::Loaded(model) => Some(&model.version),
            Self::Unloaded => None,
        }
    }
}

/// Loads models from the tracking service or local store and serves predictions
#[derive(Debug)]
pub struct ModelPredictor {
    tracking: Option<Arc<dyn TrackingClient>>,
    model_name: String,
    state: Mutex<ServingState>,
}

impl ModelPredictor {
    pub fn new(tracking: Option<Arc<dyn TrackingClient>>) -> Self {
        Self {
            tracking,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            state: Mutex::new(ServingState::Unloaded),
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Version currently served, if any
    pub async fn current_version(&self) -> Option<String> {
        self.state.lock().await.version().map(str::to_string)
    }

    fn tracking(&self) -> Result<&Arc<dyn TrackingClient>, DomainError> {
        self.tracking
            .as_ref()
            .ok_or_else(|| DomainError::tracking("Tracking client not initialized"))
    }

    async fn fetch(&self, tracked: TrackedModel) -> Result<LoadedModel, DomainError> {
        let model = self.tracking()?.load_model(&tracked.model_uri).await?;

        Ok(LoadedModel {
            version: tracked.version.clone(),
            run_id: Some(tracked.run_id.clone()),
            model,
            source: ModelSource::Tracked(tracked),
        })
    }

    async fn fetch_version(&self, version: &str) -> Result<LoadedModel, DomainError> {
        let tracked = self
            .tracking()?
            .get_model_by_version(version)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Model version {} not found", version)))?;

        self.fetch(tracked).await
    }

    /// Serve the model in the Production stage
    pub async fn load_production(&self) -> Result<String, DomainError> {
        let mut state = self.state.lock().await;

        let tracked = self
            .tracking()?
            .get_latest_production_model()
            .await?
            .ok_or_else(|| DomainError::not_found("No production model found"))?;
        let loaded = self.fetch(tracked).await?;
        let version = loaded.version.clone();

        *state = ServingState::Loaded(loaded);
        info!(version = %version, "Loaded production model");
        Ok(version)
    }

    /// Serve a specific registered version
    pub async fn load_version(&self, version: &str) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;

        let loaded = self.fetch_version(version).await?;
        *state = ServingState::Loaded(loaded);

        info!(version, "Loaded model version");
        Ok(())
    }

    /// Serve the latest model persisted under `dir`
    pub async fn load_latest_local(&self, dir: impl AsRef<Path>) -> Result<String, DomainError> {
        let mut state = self.state.lock().await;

        let (metadata, model) = LocalArtifactStore::new(dir.as_ref()).read_latest()?;
        let version = metadata.version.to_string();

        *state = ServingState::Loaded(LoadedModel {
            version: version.clone(),
            run_id: None,
            model,
            source: ModelSource::Local(metadata),
        });

        info!(version = %version, dir = %dir.as_ref().display(), "Loaded local model");
        Ok(version)
    }

    /// Predict one feature record, switching versions first when asked to
    pub async fn predict(
        &self,
        features: &FeatureRecord,
        model_version: Option<&str>,
    ) -> Result<PredictionResult, DomainError> {
        let mut state = self.state.lock().await;
        self.ensure_version(&mut state, model_version).await?;

        let loaded = state.loaded()?;
        let x = Table::from_record(features, loaded.model.feature_names())?;
        score(loaded, &x)
    }

    /// Predict every row of `x`
    pub async fn predict_batch(
        &self,
        x: &Table,
        model_version: Option<&str>,
    ) -> Result<PredictionResult, DomainError> {
        let mut state = self.state.lock().await;
        self.ensure_version(&mut state, model_version).await?;

        let loaded = state.loaded()?;
        if x.is_empty() {
            return Err(DomainError::data("Nothing to predict"));
        }
        score(loaded, x)
    }

    async fn ensure_version(
        &self,
        state: &mut ServingState,
        model_version: Option<&str>,
    ) -> Result<(), DomainError> {
        let Some(requested) = model_version else {
            return Ok(());
        };

        if state.version() != Some(requested) {
            let loaded = self.fetch_version(requested).await?;
            info!(version = requested, "Switched served model version");
            *state = ServingState::Loaded(loaded);
        }

        Ok(())
    }

    /// Description of the served model
    pub async fn get_model_info(&self) -> Result<ModelInfo, DomainError> {
        let state = self.state.lock().await;
        let loaded = state.loaded()?;

        let info = match &loaded.source {
            ModelSource::Tracked(tracked) => ModelInfo {
                model_name: self.model_name.clone(),
                model_version: loaded.version.clone(),
                model_run_id: loaded.run_id.clone(),
                training_date: tracked
                    .tags
                    .get(TRAINING_DATE_TAG)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_TRAINING_DATE.to_string()),
                metrics: tracked.metrics.clone(),
                parameters: tracked.params.clone(),
                is_production: tracked.is_production(),
            },
            ModelSource::Local(metadata) => ModelInfo {
                model_name: self.model_name.clone(),
                model_version: loaded.version.clone(),
                model_run_id: None,
                training_date: metadata.training_date.to_rfc3339(),
                metrics: metadata.metrics.clone(),
                parameters: metadata
                    .parameters
                    .iter()
                    .map(|(k, v)| (k.clone(), param_string(v)))
                    .collect::<BTreeMap<_, _>>(),
                is_production: false,
            },
        };

        Ok(info)
    }
}

fn score(loaded: &LoadedModel, x: &Table) -> Result<PredictionResult, DomainError> {
    let prediction = loaded.model.predict(x)?;
    let confidence = loaded.model.predict_proba(x)?.and_then(|proba| {
        proba
            .iter()
            .flatten()
            .copied()
            .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))))
    });

    Ok(PredictionResult {
        prediction,
        model_version: loaded.version.clone(),
        model_run_id: loaded.run_id.clone(),
        confidence,
    })
}

fn param_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::domain::classifier::mock::StubClassifier;
    use crate::domain::tracking::mock::MockTrackingClient;
    use crate::domain::MetricMap;
    use crate::infrastructure::services::ModelTrainer;

    fn tracked(version: &str) -> TrackedModel {
        TrackedModel {
            model_uri: format!("models:/mlops-model/{}", version),
            version: version.to_string(),
            run_id: format!("run-{}", version),
            tags: BTreeMap::from([(
                TRAINING_DATE_TAG.to_string(),
                "2024-01-01T00:00:00Z".to_string(),
            )]),
            metrics: MetricMap::from([("accuracy".to_string(), 0.9)]),
            params: BTreeMap::from([("n_estimators".to_string(), "100".to_string())]),
            stage: None,
        }
    }

    fn stub(label: Label) -> Arc<dyn Classifier> {
        Arc::new(StubClassifier::new(&["feature1", "feature2"], vec![0, 1], label))
    }

    fn record() -> FeatureRecord {
        FeatureRecord::from([("feature1".to_string(), 1.0), ("feature2".to_string(), 2.0)])
    }

    fn two_versions() -> Arc<MockTrackingClient> {
        Arc::new(
            MockTrackingClient::new()
                .with_model(tracked("1"), stub(0))
                .with_model(tracked("2"), stub(1))
                .with_production("1"),
        )
    }

    #[tokio::test]
    async fn test_predict_before_load_is_not_loaded() {
        let predictor = ModelPredictor::new(Some(two_versions()));

        let result = predictor.predict(&record(), None).await;
        assert!(result.unwrap_err().is_not_loaded());

        let result = predictor.get_model_info().await;
        assert!(result.unwrap_err().is_not_loaded());
    }

    #[tokio::test]
    async fn test_load_production_and_info() {
        let predictor = ModelPredictor::new(Some(two_versions())).with_model_name("churn");

        assert_eq!(predictor.load_production().await.unwrap(), "1");

        let info = predictor.get_model_info().await.unwrap();
        assert_eq!(info.model_name, "churn");
        assert_eq!(info.model_version, "1");
        assert_eq!(info.model_run_id.as_deref(), Some("run-1"));
        assert_eq!(info.training_date, "2024-01-01T00:00:00Z");
        assert_eq!(info.parameters["n_estimators"], "100");
        assert!(info.is_production);

        assert_eq!(predictor.get_model_info().await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_missing_production_model_is_not_found() {
        let tracking = Arc::new(MockTrackingClient::new().with_model(tracked("1"), stub(0)));
        let predictor = ModelPredictor::new(Some(tracking));

        let result = predictor.load_production().await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_load_without_client_is_tracking_error() {
        let predictor = ModelPredictor::new(None);

        assert!(matches!(
            predictor.load_production().await,
            Err(DomainError::Tracking { .. })
        ));
        assert!(matches!(
            predictor.load_version("1").await,
            Err(DomainError::Tracking { .. })
        ));
    }

    #[tokio::test]
    async fn test_version_switch_reloads_once() {
        let tracking = two_versions();
        let predictor = ModelPredictor::new(Some(tracking.clone()));
        predictor.load_version("1").await.unwrap();
        assert_eq!(tracking.load_calls(), 1);

        let result = predictor.predict(&record(), Some("2")).await.unwrap();
        assert_eq!(result.model_version, "2");
        assert_eq!(result.prediction, vec![1]);
        assert_eq!(tracking.load_calls(), 2);

        predictor.predict(&record(), Some("2")).await.unwrap();
        predictor.predict(&record(), None).await.unwrap();
        assert_eq!(tracking.load_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_version_switches_never_mix_models() {
        let predictor = Arc::new(ModelPredictor::new(Some(two_versions())));
        let input = record();

        let (a, b, c, d, e, f) = tokio::join!(
            predictor.predict(&input, Some("1")),
            predictor.predict(&input, Some("2")),
            predictor.predict(&input, Some("1")),
            predictor.predict(&input, Some("2")),
            predictor.predict(&input, Some("2")),
            predictor.predict(&input, Some("1")),
        );

        let mut handles = Vec::new();
        for i in 0..16 {
            let predictor = predictor.clone();
            let input = input.clone();
            handles.push(tokio::spawn(async move {
                let version = if i % 2 == 0 { "1" } else { "2" };
                predictor.predict(&input, Some(version)).await
            }));
        }

        let mut results = vec![a, b, c, d, e, f];
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        for result in results {
            let result = result.unwrap();
            let expected = if result.model_version == "1" { 0 } else { 1 };
            assert_eq!(result.prediction, vec![expected]);
            assert_eq!(
                result.model_run_id.as_deref(),
                Some(format!("run-{}", result.model_version).as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_version_leaves_state_unchanged() {
        let predictor = ModelPredictor::new(Some(two_versions()));
        predictor.load_version("1").await.unwrap();
        let before = predictor.get_model_info().await.unwrap();

        let result = predictor.load_version("v_does_not_exist").await;
        assert!(result.unwrap_err().is_not_found());

        let result = predictor.predict(&record(), Some("v_does_not_exist")).await;
        assert!(result.unwrap_err().is_not_found());

        assert_eq!(predictor.current_version().await.as_deref(), Some("1"));
        assert_eq!(predictor.get_model_info().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_confidence_follows_probability_support() {
        let with_proba: Arc<dyn Classifier> = Arc::new(
            StubClassifier::new(&["feature1", "feature2"], vec![0, 1], 1).with_proba(vec![0.2, 0.8]),
        );
        let tracking = Arc::new(
            MockTrackingClient::new()
                .with_model(tracked("1"), stub(0))
                .with_model(tracked("2"), with_proba),
        );
        let predictor = ModelPredictor::new(Some(tracking));

        let result = predictor.predict(&record(), Some("1")).await.unwrap();
        assert_eq!(result.confidence, None);

        let result = predictor.predict(&record(), Some("2")).await.unwrap();
        assert_eq!(result.confidence, Some(0.8));
        assert_eq!(result.model_run_id.as_deref(), Some("run-2"));
    }

    #[tokio::test]
    async fn test_missing_feature_is_data_error() {
        let predictor = ModelPredictor::new(Some(two_versions()));
        predictor.load_version("1").await.unwrap();

        let partial = FeatureRecord::from([("feature1".to_string(), 1.0)]);
        let result = predictor.predict(&partial, None).await;
        assert!(matches!(result, Err(DomainError::Data { .. })));
    }

    #[tokio::test]
    async fn test_serves_latest_local_model() {
        let dir = tempfile::tempdir().unwrap();
        let x = Table::new(
            vec!["feature1".to_string(), "feature2".to_string()],
            (0..30)
                .map(|i| vec![if i % 2 == 0 { -1.0 } else { 1.0 }, (i % 4) as f64])
                .collect(),
        )
        .unwrap();
        let y: Vec<Label> = (0..30).map(|i| i % 2).collect();

        let mut config = ModelConfig::default();
        config
            .model_params
            .insert("n_estimators".into(), serde_json::json!(5));

        let mut trainer = ModelTrainer::new();
        trainer.configure(config).unwrap();
        trainer.train(&x, &y, None).unwrap();
        trainer.evaluate(&x, &y).unwrap();
        let persisted = trainer.persist_local(dir.path()).unwrap();

        let predictor = ModelPredictor::new(None);
        let version = predictor.load_latest_local(dir.path()).await.unwrap();
        assert_eq!(version, persisted.metadata.version.to_string());

        let result = predictor.predict_batch(&x, None).await.unwrap();
        assert_eq!(result.prediction, y);
        assert_eq!(result.model_run_id, None);
        assert!(result.confidence.is_some());

        let info = predictor.get_model_info().await.unwrap();
        assert!(!info.is_production);
        assert_eq!(info.metrics, trainer.metrics());
        assert_eq!(info.parameters["n_estimators"], "5");
    }
}
