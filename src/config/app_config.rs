use std::path::PathBuf;

use serde::Deserialize;

/// Tracking server used when nothing else is configured
pub const DEFAULT_TRACKING_URI: &str = "http://localhost:5000";

/// Registered model name used when nothing else is configured
pub const DEFAULT_MODEL_NAME: &str = "mlops-model";

/// Process-wide variables applied on top of the layered sources
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MODEL_NAME_ENV: &str = "MODEL_NAME";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub tracking: TrackingConfig,
    pub database: DatabaseConfig,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub uri: String,
    pub experiment_id: String,
    pub timeout_secs: u64,
}

/// Metadata database; disabled when `url` is unset
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,
    pub config_path: PathBuf,
    pub model_dir: PathBuf,
    pub data_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_TRACKING_URI.to_string(),
            experiment_id: "0".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            config_path: PathBuf::from("config/model_config.yaml"),
            model_dir: PathBuf::from("models/saved_models"),
            data_path: PathBuf::from("data/processed/train.csv"),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: Self = config.try_deserialize()?;
        app.apply_overrides(|key| std::env::var(key).ok());
        Ok(app)
    }

    /// Apply the well-known variables; empty values are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(uri) = lookup(TRACKING_URI_ENV) {
            self.tracking.uri = uri;
        }
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.database.url = Some(url);
        }
        if let Some(name) = lookup(MODEL_NAME_ENV) {
            self.model.name = name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tracking.uri, "http://localhost:5000");
        assert_eq!(config.model.name, "mlops-model");
        assert_eq!(config.model.model_dir, PathBuf::from("models/saved_models"));
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            (TRACKING_URI_ENV, "http://mlflow:5000"),
            (DATABASE_URL_ENV, "postgres://localhost/mlops"),
            (MODEL_NAME_ENV, ""),
        ]);

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tracking.uri, "http://mlflow:5000");
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/mlops")
        );
        assert_eq!(config.model.name, "mlops-model");
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "tracking:\n  timeout_secs: 5\nlogging:\n  format: json\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.tracking.timeout_secs, 5);
        assert_eq!(config.tracking.uri, DEFAULT_TRACKING_URI);
        assert!(matches!(config.logging.format, LogFormat::Json));
    }
}
