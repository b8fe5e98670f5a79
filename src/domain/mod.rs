//! Domain layer - Model lifecycle entities and collaborator contracts

pub mod classifier;
pub mod data_access;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod tracking;
pub mod version;

pub use classifier::{Classifier, ModelArtifact};
pub use data_access::DataAccess;
pub use dataset::{FeatureRecord, Label, Split, Table};
pub use error::DomainError;
pub use metadata::{ModelInfo, ModelMetadata, ModelRecord, ParamMap, TrackedModel};
pub use metrics::{EvaluationReport, MetricMap, RocAuc, RocAucUnavailable};
pub use tracking::{ArtifactMap, TrackingClient};
pub use version::ModelVersion;
