//! Failure prediction models
//!
//! Every model kind implements [`Predictor`]. The registry and schedulers
//! only ever talk to the trait.

mod anomaly_score;
mod fallback;
mod features;
mod math;
mod neural;
mod pattern;
mod registry;
mod scheduler;
mod trees;

pub use anomaly_score::AnomalyScorePredictor;
pub use fallback::FallbackPredictor;
pub use features::{
    index, linear_regression_slope, mean, population_std_dev, FeatureExtractor, FEATURE_NAMES,
    NUM_FEATURES,
};
pub use math::{estimate_time_to_failure, trigger_metrics, NeumaierSum};
pub use neural::FeedForwardPredictor;
pub use pattern::SequencePatternPredictor;
pub use registry::{ModelRegistry, ModelStatus, PredictorSlot, TrainingResult};
pub use scheduler::{PredictionBoard, PredictionScheduler, DEFAULT_PREDICTION_INTERVAL};
pub use trees::{GradientBoostedPredictor, TreeEnsemblePredictor};

use crate::config::ModelKind;
use crate::models::FeatureVector;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw output of a single predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub probability: f64,
    /// Minutes until the predicted failure
    pub time_to_failure: f64,
    pub confidence: f64,
    pub trigger_metrics: BTreeMap<String, f64>,
}

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Model kind implemented by this predictor
    fn kind(&self) -> ModelKind;

    /// Whether a training pass has completed successfully
    fn is_trained(&self) -> bool;

    /// Fit the model to labelled feature vectors. On error the model state
    /// must be left as it was.
    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()>;

    /// Score a feature vector. Read-only.
    fn predict(&self, features: &FeatureVector) -> Result<Forecast>;

    /// Independent copy used to train off to the side
    fn fork(&self) -> Box<dyn Predictor>;
}

/// Build an untrained predictor of the given kind
pub fn build_predictor(kind: ModelKind) -> Box<dyn Predictor> {
    match kind {
        ModelKind::SequencePattern => Box::new(SequencePatternPredictor::new()),
        ModelKind::TreeEnsemble => Box::new(TreeEnsemblePredictor::new()),
        ModelKind::GradientBoosted => Box::new(GradientBoostedPredictor::new()),
        ModelKind::FeedForward => Box::new(FeedForwardPredictor::new()),
        ModelKind::AnomalyScore => Box::new(AnomalyScorePredictor::new()),
    }
}
