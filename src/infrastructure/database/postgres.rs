//! PostgreSQL metadata database

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::migrations::{metadata_migrations, PostgresMigrator};
use crate::domain::{DataAccess, DomainError, ModelRecord};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// `DataAccess` backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PostgresDataAccess {
    pool: PgPool,
}

impl PostgresDataAccess {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| DomainError::database(format!("Failed to connect: {}", e)))?;

        let applied = PostgresMigrator::new(pool.clone())
            .run(&metadata_migrations())
            .await?;
        info!(applied, "Metadata database ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl DataAccess for PostgresDataAccess {
    async fn save_model_metadata(&self, record: &ModelRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO model_metadata (model_name, model_version, model_run_id, training_date,
                                        metrics, parameters, is_production)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.model_name)
        .bind(&record.model_version)
        .bind(&record.model_run_id)
        .bind(record.training_date)
        .bind(Json(&record.metrics))
        .bind(Json(&record.parameters))
        .bind(record.is_production)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save model metadata: {}", e)))?;

        debug!(model_version = %record.model_version, "Model metadata row inserted");
        Ok(())
    }

    async fn log_performance_metric(
        &self,
        model_version: &str,
        metric_name: &str,
        metric_value: f64,
        dataset_type: &str,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO performance_metrics (model_version, metric_name, metric_value, dataset_type)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(model_version)
        .bind(metric_name)
        .bind(metric_value)
        .bind(dataset_type)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to log metric '{}': {}", metric_name, e))
        })?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
