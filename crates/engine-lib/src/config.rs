//! Engine-wide model configuration
//!
//! `ModelConfig` is built once at startup and shared read-only by every
//! component.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::EngineError;

/// Samples per feature extraction window (1 hour at 1 sample/minute)
pub const DEFAULT_WINDOW_SIZE: usize = 60;

/// Minutes after a window in which an error labels it as a failure
pub const DEFAULT_PREDICTION_HORIZON_MINUTES: u64 = 30;

pub const DEFAULT_RETRAIN_INTERVAL_HOURS: u64 = 6;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Subsystems monitored when no explicit list is configured
pub const DEFAULT_COMPONENTS: &[&str] = &["system", "network", "ai_processing", "fleet", "sensors"];

/// Scoring function used by a predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SequencePattern,
    TreeEnsemble,
    GradientBoosted,
    FeedForward,
    AnomalyScore,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SequencePattern => "sequence_pattern",
            ModelKind::TreeEnsemble => "tree_ensemble",
            ModelKind::GradientBoosted => "gradient_boosted",
            ModelKind::FeedForward => "feed_forward",
            ModelKind::AnomalyScore => "anomaly_score",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence_pattern" | "lstm" => Ok(ModelKind::SequencePattern),
            "tree_ensemble" | "random_forest" => Ok(ModelKind::TreeEnsemble),
            "gradient_boosted" | "xgboost" => Ok(ModelKind::GradientBoosted),
            "feed_forward" | "neural_network" => Ok(ModelKind::FeedForward),
            "anomaly_score" | "isolation_forest" => Ok(ModelKind::AnomalyScore),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown model type '{}'",
                other
            ))),
        }
    }
}

/// Thresholds for the real-time anomaly check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub network_latency: f64,
    pub error_rate: f64,
    pub response_time: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            cpu_usage: 90.0,
            memory_usage: 95.0,
            network_latency: 1000.0,
            error_rate: 10.0,
            response_time: 5000.0,
        }
    }
}

/// Process-wide model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model kind for every component
    pub model_type: ModelKind,
    /// Per-component model kind overrides
    #[serde(default)]
    pub component_models: BTreeMap<String, ModelKind>,
    /// Monitored subsystems, one predictor each
    pub components: Vec<String>,
    pub window_size: usize,
    pub prediction_horizon_minutes: u64,
    pub retrain_interval_hours: u64,
    pub confidence_threshold: f64,
    #[serde(default)]
    pub anomaly_thresholds: AnomalyThresholds,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: ModelKind::TreeEnsemble,
            component_models: BTreeMap::new(),
            components: DEFAULT_COMPONENTS.iter().map(|c| c.to_string()).collect(),
            window_size: DEFAULT_WINDOW_SIZE,
            prediction_horizon_minutes: DEFAULT_PREDICTION_HORIZON_MINUTES,
            retrain_interval_hours: DEFAULT_RETRAIN_INTERVAL_HOURS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            anomaly_thresholds: AnomalyThresholds::default(),
        }
    }
}

impl ModelConfig {
    /// Check the configuration before handing it to the engine
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window_size < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.prediction_horizon_minutes == 0 {
            return Err(EngineError::InvalidConfig(
                "prediction_horizon_minutes must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "confidence_threshold must be within 0-1, got {}",
                self.confidence_threshold
            )));
        }
        if self.components.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one component must be monitored".to_string(),
            ));
        }
        if let Some(unknown) = self
            .component_models
            .keys()
            .find(|name| !self.components.contains(name))
        {
            return Err(EngineError::InvalidConfig(format!(
                "model override for unmonitored component '{}'",
                unknown
            )));
        }
        Ok(())
    }

    /// Model kind used for a given component
    pub fn model_for(&self, component: &str) -> ModelKind {
        self.component_models
            .get(component)
            .copied()
            .unwrap_or(self.model_type)
    }

    pub fn prediction_horizon_secs(&self) -> i64 {
        (self.prediction_horizon_minutes * 60) as i64
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_hours * 3600)
    }
}
