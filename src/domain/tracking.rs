//! Experiment-tracking service contract

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::classifier::Classifier;
use super::metadata::{ParamMap, TrackedModel};
use super::metrics::MetricMap;
use crate::domain::DomainError;

/// Artifact name to local file path
pub type ArtifactMap = BTreeMap<String, PathBuf>;

/// Client for the experiment-tracking service and its model registry
#[async_trait]
pub trait TrackingClient: Send + Sync + Debug {
    /// Model currently in the Production stage, if any
    async fn get_latest_production_model(&self) -> Result<Option<TrackedModel>, DomainError>;

    /// Registered model by version, `None` when absent
    async fn get_model_by_version(
        &self,
        version: &str,
    ) -> Result<Option<TrackedModel>, DomainError>;

    /// Fetch and decode the model stored at `model_uri`
    async fn load_model(&self, model_uri: &str) -> Result<Arc<dyn Classifier>, DomainError>;

    /// Record one training run and return its run id
    async fn log_model_training(
        &self,
        model: &dyn Classifier,
        metrics: &MetricMap,
        params: &ParamMap,
        artifacts: &ArtifactMap,
    ) -> Result<String, DomainError>;
}
