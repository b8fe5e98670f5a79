//! End-to-end training pipelines built on `ModelTrainer`

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::trainer::{DatabaseOutcome, ModelTrainer};
use crate::config::ModelConfig;
use crate::domain::dataset::{
    features_and_target, train_test_split, DEFAULT_SPLIT_SEED, DEFAULT_TEST_SIZE,
};
use crate::domain::{DomainError, EvaluationReport, MetricMap, ModelVersion, Split};
use crate::infrastructure::data::load_csv;

/// Outcome of a local training run
#[derive(Debug, Clone, Serialize)]
pub struct LocalRunSummary {
    pub version: ModelVersion,
    pub metrics: MetricMap,
    pub report: EvaluationReport,
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Outcome of a tracked training run
#[derive(Debug, Clone, Serialize)]
pub struct TrackedRunSummary {
    pub version: ModelVersion,
    pub run_id: String,
    pub metrics: MetricMap,
    pub report: EvaluationReport,
    pub metadata_saved: DatabaseOutcome,
    pub metrics_saved: DatabaseOutcome,
}

/// Load a CSV dataset and hold out a seeded test split
fn prepare_split(config: &ModelConfig, data_path: &Path) -> Result<Split, DomainError> {
    let data = load_csv(data_path)?;

    let (x, y) = features_and_target(&data, &config.target, &config.features)?;
    info!(features = ?x.columns(), target = %config.target, "Prepared features and target");

    let split = train_test_split(&x, &y, DEFAULT_TEST_SIZE, DEFAULT_SPLIT_SEED)?;
    info!(
        train_rows = split.y_train.len(),
        test_rows = split.y_test.len(),
        "Split data"
    );

    Ok(split)
}

/// Train, evaluate and persist a model into `model_dir`
pub fn run_local_pipeline(
    trainer: &mut ModelTrainer,
    config: ModelConfig,
    data_path: impl AsRef<Path>,
    model_dir: impl AsRef<Path>,
) -> Result<LocalRunSummary, DomainError> {
    info!("Starting model training pipeline");

    trainer.configure(config)?;
    let split = prepare_split(trainer.config(), data_path.as_ref())?;

    trainer.train(&split.x_train, &split.y_train, None)?;
    let report = trainer.evaluate(&split.x_test, &split.y_test)?;
    let persisted = trainer.persist_local(model_dir)?;

    info!(
        version = %persisted.metadata.version,
        model = %persisted.model_path.display(),
        metadata = %persisted.metadata_path.display(),
        "Training complete"
    );

    Ok(LocalRunSummary {
        version: persisted.metadata.version.clone(),
        metrics: report.metrics(),
        report,
        model_path: persisted.model_path,
        metadata_path: persisted.metadata_path,
        train_rows: split.y_train.len(),
        test_rows: split.y_test.len(),
    })
}

/// Train, evaluate, log to the tracking service and mirror to the database.
///
/// The trainer's database connection is closed whether or not the run succeeds.
pub async fn run_tracked_pipeline(
    trainer: &mut ModelTrainer,
    config: ModelConfig,
    data_path: impl AsRef<Path>,
    artifacts_dir: Option<&Path>,
) -> Result<TrackedRunSummary, DomainError> {
    info!("Starting tracked training pipeline");

    let result = tracked_run(trainer, config, data_path.as_ref(), artifacts_dir).await;
    trainer.cleanup().await;
    result
}

async fn tracked_run(
    trainer: &mut ModelTrainer,
    config: ModelConfig,
    data_path: &Path,
    artifacts_dir: Option<&Path>,
) -> Result<TrackedRunSummary, DomainError> {
    trainer.configure(config)?;
    let split = prepare_split(trainer.config(), data_path)?;

    trainer.train(&split.x_train, &split.y_train, None)?;
    let report = trainer.evaluate(&split.x_test, &split.y_test)?;

    let params = trainer.parameters().cloned().unwrap_or_default();
    let run_id = trainer.log_remote(&params, artifacts_dir).await?;

    let version = ModelVersion::generate();
    let metadata_saved = trainer
        .save_to_database(version.as_str(), &run_id, &params)
        .await?;
    let metrics_saved = trainer.save_performance_metrics(version.as_str()).await?;

    info!(version = %version, run_id = %run_id, "Tracked training pipeline completed");

    Ok(TrackedRunSummary {
        version,
        run_id,
        metrics: report.metrics(),
        report,
        metadata_saved,
        metrics_saved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::data_access::MockDataAccess;
    use crate::domain::tracking::mock::MockTrackingClient;
    use crate::infrastructure::data::{generate_sample_data, write_csv, SAMPLE_ROWS, SAMPLE_SEED};
    use crate::infrastructure::store::LocalArtifactStore;
    use serde_json::json;

    fn fast_config() -> ModelConfig {
        ModelConfig {
            model_params: json!({ "n_estimators": 10, "max_depth": 6 })
                .as_object()
                .cloned()
                .unwrap(),
            ..ModelConfig::default()
        }
    }

    fn sample_csv(dir: &Path) -> PathBuf {
        let path = dir.join("data").join("train.csv");
        write_csv(&path, &generate_sample_data(SAMPLE_ROWS, SAMPLE_SEED).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_local_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = sample_csv(dir.path());
        let model_dir = dir.path().join("models");

        let mut trainer = ModelTrainer::new();
        let summary = run_local_pipeline(&mut trainer, fast_config(), &data_path, &model_dir).unwrap();

        assert_eq!(summary.train_rows, 800);
        assert_eq!(summary.test_rows, 200);
        assert!(summary.model_path.exists());
        assert!(summary.metadata_path.exists());

        let store = LocalArtifactStore::new(&model_dir);
        let (latest, model) = store.read_latest().unwrap();
        let (versioned, _) = store.read_version(&summary.version).unwrap();

        assert_eq!(latest, versioned);
        assert_eq!(latest.metrics, summary.metrics);
        assert_eq!(latest.features, vec!["feature1", "feature2", "feature3"]);
        assert_eq!(latest.target, "target");
        assert_eq!(model.feature_names(), latest.features.as_slice());
        assert!(summary.metrics.contains_key("roc_auc"));
    }

    #[test]
    fn test_local_pipeline_requires_target_column() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = sample_csv(dir.path());

        let config = ModelConfig {
            target: "label".to_string(),
            ..fast_config()
        };

        let mut trainer = ModelTrainer::new();
        let result = run_local_pipeline(&mut trainer, config, &data_path, dir.path());
        assert!(matches!(result, Err(DomainError::Data { .. })));
    }

    #[tokio::test]
    async fn test_tracked_pipeline_mirrors_to_database() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = sample_csv(dir.path());

        let mut db = MockDataAccess::new();
        db.expect_save_model_metadata()
            .withf(|record| record.model_run_id == "run-1")
            .times(1)
            .returning(|_| Ok(()));
        db.expect_log_performance_metric()
            .times(5)
            .returning(|_, _, _, _| Ok(()));
        db.expect_close().times(1).return_const(());

        let tracking = Arc::new(MockTrackingClient::new());
        let mut trainer = ModelTrainer::new()
            .with_tracking(tracking.clone())
            .with_data_access(Arc::new(db));

        let artifacts = dir.path().join("artifacts");
        let summary = run_tracked_pipeline(&mut trainer, fast_config(), &data_path, Some(&artifacts))
            .await
            .unwrap();

        assert_eq!(summary.run_id, "run-1");
        assert!(summary.metadata_saved.is_saved());
        assert!(summary.metrics_saved.is_saved());
        assert_eq!(tracking.logged_runs()[0].metrics, summary.metrics);
        assert!(artifacts.join("model.json").exists());
    }

    #[tokio::test]
    async fn test_tracked_pipeline_survives_database_failure() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = sample_csv(dir.path());

        let mut db = MockDataAccess::new();
        db.expect_save_model_metadata()
            .returning(|_| Err(DomainError::database("down")));
        db.expect_log_performance_metric()
            .returning(|_, _, _, _| Err(DomainError::database("down")));
        db.expect_close().times(1).return_const(());

        let mut trainer = ModelTrainer::new()
            .with_tracking(Arc::new(MockTrackingClient::new()))
            .with_data_access(Arc::new(db));

        let summary = run_tracked_pipeline(&mut trainer, fast_config(), &data_path, None)
            .await
            .unwrap();

        assert!(matches!(summary.metadata_saved, DatabaseOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_tracked_pipeline_closes_database_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = sample_csv(dir.path());

        let mut db = MockDataAccess::new();
        db.expect_close().times(1).return_const(());

        let tracking = Arc::new(MockTrackingClient::new().with_error("tracking server down"));
        let mut trainer = ModelTrainer::new()
            .with_tracking(tracking)
            .with_data_access(Arc::new(db));

        let result = run_tracked_pipeline(&mut trainer, fast_config(), &data_path, None).await;
        assert!(matches!(result, Err(DomainError::Tracking { .. })));
    }
}
