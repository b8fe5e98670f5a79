//! Classifier implementations and artifact decoding

mod forest;
mod params;
mod tree;

use std::sync::Arc;

pub use forest::{RandomForestClassifier, RANDOM_FOREST_MODEL_TYPE};
pub use params::{
    Criterion, ForestParams, MaxFeatures, DEFAULT_MAX_DEPTH, DEFAULT_N_ESTIMATORS,
    DEFAULT_RANDOM_STATE,
};
pub use tree::DecisionTree;

use crate::domain::{Classifier, DomainError, ModelArtifact};

/// Rebuild a classifier from its artifact envelope
pub fn decode_artifact(artifact: ModelArtifact) -> Result<Arc<dyn Classifier>, DomainError> {
    match artifact.model_type.as_str() {
        RANDOM_FOREST_MODEL_TYPE => Ok(Arc::new(RandomForestClassifier::from_json(
            artifact.model,
        )?)),
        other => Err(DomainError::data(format!(
            "Unsupported model type '{}'",
            other
        ))),
    }
}

/// Decode a serialized artifact
pub fn decode_artifact_bytes(bytes: &[u8]) -> Result<Arc<dyn Classifier>, DomainError> {
    decode_artifact(ModelArtifact::from_bytes(bytes)?)
}
