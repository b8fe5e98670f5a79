//! Classifier contract and the serialized artifact envelope

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::dataset::{Label, Table};
use super::version::ModelVersion;
use crate::domain::DomainError;

/// A fitted classifier that can score feature tables
pub trait Classifier: Send + Sync + Debug {
    /// Fixed model kind recorded in metadata
    fn model_type(&self) -> &'static str;

    /// Sorted class labels seen during fitting
    fn classes(&self) -> &[Label];

    /// Feature columns the model was fitted on, in order
    fn feature_names(&self) -> &[String];

    /// Predicted label per row
    fn predict(&self, x: &Table) -> Result<Vec<Label>, DomainError>;

    /// Per-class probabilities per row, columns ordered as `classes()`.
    ///
    /// `Ok(None)` means the classifier has no probability output.
    fn predict_proba(&self, _x: &Table) -> Result<Option<Vec<Vec<f64>>>, DomainError> {
        Ok(None)
    }

    /// Model-specific serialized payload
    fn to_json(&self) -> Result<serde_json::Value, DomainError>;
}

/// Serialized classifier bound to at most one model version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ModelVersion>,
    pub model_type: String,
    pub model: serde_json::Value,
}

impl ModelArtifact {
    pub fn from_classifier(
        classifier: &dyn Classifier,
        version: Option<ModelVersion>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            version,
            model_type: classifier.model_type().to_string(),
            model: classifier.to_json()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self)
            .map_err(|e| DomainError::data(format!("Failed to serialize model artifact: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| DomainError::data(format!("Malformed model artifact: {}", e)))
    }
}
