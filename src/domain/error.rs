use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data error: {message}")]
    Data { message: String },

    #[error("Persist error: {message}")]
    Persist { message: String },

    #[error("Tracking error: {message}")]
    Tracking { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Model not loaded: {message}")]
    NotLoaded { message: String },

    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl DomainError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }

    pub fn tracking(message: impl Into<String>) -> Self {
        Self::Tracking {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn not_loaded(message: impl Into<String>) -> Self {
        Self::NotLoaded {
            message: message.into(),
        }
    }

    pub fn invalid_state(expected: &'static str, actual: &'static str) -> Self {
        Self::InvalidState { expected, actual }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }
}
