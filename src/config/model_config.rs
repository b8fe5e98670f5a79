use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{DomainError, ParamMap};

/// Target column used when the file names none
pub const DEFAULT_TARGET: &str = "target";

/// Training configuration read from `model_config.yaml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_params: ParamMap,
    /// Feature columns to train on; empty means every non-target column
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_params: ParamMap::new(),
            features: Vec::new(),
            target: default_target(),
        }
    }
}

impl ModelConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let source = config::File::from(path)
            .format(config::FileFormat::Yaml)
            .required(true);

        Self::build(config::Config::builder().add_source(source))
            .map_err(|e| DomainError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainError> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::from_str(yaml, config::FileFormat::Yaml)),
        )
        .map_err(|e| DomainError::config(e.to_string()))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, DomainError> {
        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DomainError::config(format!("Invalid model configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Structural checks; parameter values are checked by the trainer
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.target.trim().is_empty() {
            return Err(DomainError::config("Target column name must not be empty"));
        }

        let mut seen = BTreeSet::new();
        for feature in &self.features {
            if feature.trim().is_empty() {
                return Err(DomainError::config("Feature names must not be empty"));
            }
            if feature == &self.target {
                return Err(DomainError::config(format!(
                    "Target '{}' cannot also be a feature",
                    feature
                )));
            }
            if !seen.insert(feature) {
                return Err(DomainError::config(format!(
                    "Feature '{}' is listed twice",
                    feature
                )));
            }
        }

        Ok(())
    }
}
