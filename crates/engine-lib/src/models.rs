//! Core data models for the failure prediction engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

/// Operational metrics sampled by the host environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// CPU usage percent (0-100)
    pub cpu_usage: f64,
    /// Memory usage percent (0-100)
    pub memory_usage: f64,
    /// Network latency in milliseconds
    pub network_latency: f64,
    pub active_connections: f64,
    /// Errors per minute as a percentage of requests
    pub error_rate: f64,
    /// Response time in milliseconds
    pub response_time: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Disk usage percent (0-100)
    pub disk_usage: f64,
}

impl MetricsSample {
    /// Reject samples that would poison the history
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.timestamp <= 0 {
            return Err(EngineError::InvalidSample(format!(
                "timestamp must be positive, got {}",
                self.timestamp
            )));
        }

        let fields = [
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
            ("network_latency", self.network_latency),
            ("active_connections", self.active_connections),
            ("error_rate", self.error_rate),
            ("response_time", self.response_time),
            ("temperature", self.temperature),
            ("disk_usage", self.disk_usage),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::InvalidSample(format!(
                    "{} is not a finite number",
                    name
                )));
            }
        }

        for (name, value) in [
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
            ("disk_usage", self.disk_usage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::InvalidSample(format!(
                    "{} must be within 0-100, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("network_latency", self.network_latency),
            ("active_connections", self.active_connections),
            ("error_rate", self.error_rate),
            ("response_time", self.response_time),
        ] {
            if value < 0.0 {
                return Err(EngineError::InvalidSample(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Severity of an error event, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "low"),
            ErrorSeverity::Medium => write!(f, "medium"),
            ErrorSeverity::High => write!(f, "high"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Typed error event raised by an external error-handling component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: String,
    /// Kind tag, e.g. "network_timeout"
    pub kind: String,
    pub severity: ErrorSeverity,
    pub message: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Originating subsystem
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl ErrorEvent {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidEvent("id must not be empty".to_string()));
        }
        if self.kind.trim().is_empty() {
            return Err(EngineError::InvalidEvent("kind must not be empty".to_string()));
        }
        if self.component.trim().is_empty() {
            return Err(EngineError::InvalidEvent(
                "component must not be empty".to_string(),
            ));
        }
        if self.timestamp <= 0 {
            return Err(EngineError::InvalidEvent(format!(
                "timestamp must be positive, got {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Fixed-length feature vector derived from a window of samples.
///
/// Field order follows [`crate::predictor::FEATURE_NAMES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    /// Timestamp of the most recent sample in the window
    pub window_end: i64,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }
}

/// Information about errors observed after a training window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleMetadata {
    pub future_error_count: usize,
    pub future_error_kinds: Vec<String>,
}

/// Labelled window used during a training pass
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    /// 1 if any error occurred within the prediction horizon after the window
    pub label: u8,
    pub timestamp: i64,
    pub metadata: ExampleMetadata,
}

/// Kind of failure a prediction refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionType {
    SystemFailure,
    PerformanceDegradation,
    ComponentFailure,
}

impl std::fmt::Display for PredictionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionType::SystemFailure => write!(f, "SYSTEM_FAILURE"),
            PredictionType::PerformanceDegradation => write!(f, "PERFORMANCE_DEGRADATION"),
            PredictionType::ComponentFailure => write!(f, "COMPONENT_FAILURE"),
        }
    }
}

/// Severity derived from a prediction's probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PredictionSeverity {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.9 {
            PredictionSeverity::Critical
        } else if probability >= 0.7 {
            PredictionSeverity::High
        } else if probability >= 0.5 {
            PredictionSeverity::Medium
        } else {
            PredictionSeverity::Low
        }
    }
}

impl std::fmt::Display for PredictionSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionSeverity::Low => write!(f, "low"),
            PredictionSeverity::Medium => write!(f, "medium"),
            PredictionSeverity::High => write!(f, "high"),
            PredictionSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A failure forecast exposed to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub id: String,
    pub timestamp: i64,
    pub prediction_type: PredictionType,
    pub probability: f64,
    /// Minutes until the predicted failure
    pub time_to_failure: f64,
    pub affected_components: Vec<String>,
    pub severity: PredictionSeverity,
    pub recommended_actions: Vec<String>,
    pub confidence: f64,
    pub trigger_metrics: BTreeMap<String, f64>,
}

/// Model quality figures exposed through the query surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Unix timestamp of the last successful training pass
    pub last_training: Option<i64>,
    /// Training examples used by the last successful pass
    pub data_points: usize,
    pub positive_examples: usize,
    /// Figures are measured on the training data, not a held-out set
    pub estimate: bool,
}
