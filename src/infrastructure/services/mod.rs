//! Infrastructure services

mod pipeline;
mod predictor;
mod trainer;

pub use pipeline::{run_local_pipeline, run_tracked_pipeline, LocalRunSummary, TrackedRunSummary};
pub use predictor::{ModelPredictor, PredictionResult};
pub use trainer::{DatabaseOutcome, ModelTrainer, TrainerState};
