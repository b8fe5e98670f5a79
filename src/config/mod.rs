//! Application and model configuration

mod app_config;
mod model_config;

pub use app_config::{
    AppConfig, DatabaseConfig, LogFormat, LoggingConfig, ModelSettings, TrackingConfig,
    DATABASE_URL_ENV, DEFAULT_MODEL_NAME, DEFAULT_TRACKING_URI, MODEL_NAME_ENV, TRACKING_URI_ENV,
};
pub use model_config::{ModelConfig, DEFAULT_TARGET};
