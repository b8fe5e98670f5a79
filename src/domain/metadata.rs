//! Metadata records describing trained models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::MetricMap;
use super::version::ModelVersion;

/// Registry stage that serves live traffic
pub const PRODUCTION_STAGE: &str = "Production";

/// Tag carrying the training timestamp on tracked models
pub const TRAINING_DATE_TAG: &str = "training_date";

/// Placeholder for a training date that was never recorded
pub const UNKNOWN_TRAINING_DATE: &str = "Unknown";

/// Hyperparameter name to value, as passed to the classifier
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// Metadata document written next to every local artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: ModelVersion,
    pub training_date: DateTime<Utc>,
    pub model_type: String,
    pub metrics: MetricMap,
    pub parameters: ParamMap,
    pub features: Vec<String>,
    pub target: String,
    pub model_path: String,
}

/// Model as described by the tracking service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedModel {
    pub model_uri: String,
    pub version: String,
    pub run_id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: MetricMap,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl TrackedModel {
    pub fn is_production(&self) -> bool {
        self.stage.as_deref() == Some(PRODUCTION_STAGE)
    }
}

/// Row mirrored into the metadata database after a tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_name: String,
    pub model_version: String,
    pub model_run_id: String,
    pub training_date: DateTime<Utc>,
    pub metrics: MetricMap,
    pub parameters: ParamMap,
    pub is_production: bool,
}

/// Summary of the model currently being served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_version: String,
    pub model_run_id: Option<String>,
    pub training_date: String,
    pub metrics: MetricMap,
    pub parameters: BTreeMap<String, String>,
    pub is_production: bool,
}
