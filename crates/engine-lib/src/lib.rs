//! Predictive failure-detection engine
//!
//! This crate provides the core functionality for:
//! - Bounded rolling history of metrics samples and error events
//! - Window feature extraction and pluggable failure predictors
//! - Ensemble forecasting, periodic prediction and retraining
//! - Threshold-based anomaly detection with alerting
//! - Health checks and observability

pub mod anomaly;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod performance;
pub mod predictor;
pub mod training;

pub use config::{AnomalyThresholds, ModelConfig, ModelKind};
pub use engine::{EngineOptions, EngineStatus, FailureEngine};
pub use error::EngineError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use training::{TrainingOutcome, TrainingReport};
