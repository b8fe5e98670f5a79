//! Schema migrations for the metadata database

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// One forward schema change
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub up: String,
}

impl Migration {
    pub fn new(version: i64, description: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
        }
    }
}

/// Applies migrations and records them in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to check migration status: {}", e)))
    }

    /// Apply every pending migration in version order
    pub async fn run(&self, migrations: &[Migration]) -> Result<usize, DomainError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        for migration in migrations {
            if self.is_applied(migration.version).await? {
                continue;
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DomainError::database(format!("Failed to begin transaction: {}", e)))?;

            sqlx::raw_sql(&migration.up)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DomainError::database(format!(
                        "Failed to run migration {}: {}",
                        migration.version, e
                    ))
                })?;

            sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(&migration.description)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DomainError::database(format!(
                        "Failed to record migration {}: {}",
                        migration.version, e
                    ))
                })?;

            tx.commit()
                .await
                .map_err(|e| DomainError::database(format!("Failed to commit migration: {}", e)))?;

            info!(version = migration.version, description = %migration.description, "Migration applied");
            applied += 1;
        }

        Ok(applied)
    }
}

/// Tables backing model metadata and performance history
pub fn metadata_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create model_metadata table",
            r#"
            CREATE TABLE IF NOT EXISTS model_metadata (
                id BIGSERIAL PRIMARY KEY,
                model_name VARCHAR(255) NOT NULL,
                model_version VARCHAR(64) NOT NULL,
                model_run_id VARCHAR(255) NOT NULL,
                training_date TIMESTAMPTZ NOT NULL,
                metrics JSONB NOT NULL DEFAULT '{}',
                parameters JSONB NOT NULL DEFAULT '{}',
                is_production BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_model_metadata_version
                ON model_metadata(model_name, model_version);
            "#,
        ),
        Migration::new(
            2,
            "Create performance_metrics table",
            r#"
            CREATE TABLE IF NOT EXISTS performance_metrics (
                id BIGSERIAL PRIMARY KEY,
                model_version VARCHAR(64) NOT NULL,
                metric_name VARCHAR(128) NOT NULL,
                metric_value DOUBLE PRECISION NOT NULL,
                dataset_type VARCHAR(32) NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_performance_metrics_version
                ON performance_metrics(model_version);
            "#,
        ),
    ]
}
