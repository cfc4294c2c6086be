//! Error taxonomy for the engine boundary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient data: need {needed} samples, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("feature extraction requires a non-empty window")]
    EmptyWindow,

    #[error("invalid metrics sample: {0}")]
    InvalidSample(String),

    #[error("invalid error event: {0}")]
    InvalidEvent(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("model for component '{component}' failed: {message}")]
    Model { component: String, message: String },

    #[error("a training pass is already in progress")]
    TrainingInProgress,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Whether the error was caused by caller input rather than engine state
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidSample(_) | EngineError::InvalidEvent(_)
        )
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::EmptyWindow => "empty_window",
            EngineError::InvalidSample(_) => "invalid_sample",
            EngineError::InvalidEvent(_) => "invalid_event",
            EngineError::UnknownComponent(_) => "unknown_component",
            EngineError::Model { .. } => "model_failure",
            EngineError::TrainingInProgress => "training_in_progress",
            EngineError::InvalidConfig(_) => "invalid_config",
        }
    }
}
