//! Experiment-tracking service clients

mod mlflow;

pub use mlflow::{MlflowTrackingClient, DEFAULT_EXPERIMENT_ID};
