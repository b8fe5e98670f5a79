//! Metadata database contract

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::metadata::ModelRecord;
use crate::domain::DomainError;

/// Dataset split a performance metric was measured on
pub const TEST_DATASET: &str = "test";

/// Persistence of model metadata and performance history
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Store one model metadata row
    async fn save_model_metadata(&self, record: &ModelRecord) -> Result<(), DomainError>;

    /// Store one metric measurement for a model version
    async fn log_performance_metric(
        &self,
        model_version: &str,
        metric_name: &str,
        metric_value: f64,
        dataset_type: &str,
    ) -> Result<(), DomainError>;

    /// Release the underlying connection
    async fn close(&self);
}

impl std::fmt::Debug for dyn DataAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataAccess")
    }
}
