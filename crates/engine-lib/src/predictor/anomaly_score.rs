//! Anomaly-score predictor
//!
//! Learns a baseline from healthy windows (or every window when no failure
//! has been observed yet) and scores new windows by their mean absolute
//! z-score against that baseline. Calendar features are excluded from the
//! score. Each feature's contribution is capped so one drifting feature
//! cannot carry the score alone.

use super::features::index;
use super::math::{
    check_feature_vector, check_training_input, estimate_time_to_failure, margin_confidence,
    sigmoid, trigger_metrics, Standardizer,
};
use super::{FallbackPredictor, Forecast, Predictor};
use crate::config::ModelKind;
use crate::models::FeatureVector;
use anyhow::{bail, Result};

/// Percentile of baseline scores mapped to probability 0.5
const CALIBRATION_PERCENTILE: f64 = 0.95;

/// Minimum baseline windows needed to estimate a spread
const MIN_BASELINE: usize = 10;

/// Pivot floor; a mean absolute z-score of one is ordinary variation
const MIN_PIVOT: f64 = 1.0;

/// Largest absolute z-score any single feature contributes
const MAX_FEATURE_Z: f64 = 10.0;

#[derive(Debug, Clone)]
struct Baseline {
    scaler: Standardizer,
    /// Score at the calibration percentile of the baseline windows
    pivot: f64,
}

impl Baseline {
    fn score(&self, features: &FeatureVector) -> f64 {
        let z = self.scaler.transform(features);
        let scored: Vec<f64> = z
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index::HOUR_OF_DAY && *j != index::DAY_OF_WEEK)
            .map(|(_, v)| v.abs().min(MAX_FEATURE_Z))
            .collect();
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyScorePredictor {
    baseline: Option<Baseline>,
}

impl AnomalyScorePredictor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for AnomalyScorePredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::AnomalyScore
    }

    fn is_trained(&self) -> bool {
        self.baseline.is_some()
    }

    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()> {
        let positives = check_training_input(features, labels)?;

        let healthy: Vec<&FeatureVector> = if positives == labels.len() {
            features.iter().collect()
        } else {
            features
                .iter()
                .zip(labels)
                .filter(|(_, l)| **l == 0)
                .map(|(f, _)| f)
                .collect()
        };
        if healthy.len() < MIN_BASELINE {
            bail!(
                "Baseline needs at least {} windows, got {}",
                MIN_BASELINE,
                healthy.len()
            );
        }

        let mut baseline = Baseline {
            scaler: Standardizer::fit(healthy.iter().copied()),
            pivot: 0.0,
        };
        let mut scores: Vec<f64> = healthy.iter().map(|f| baseline.score(f)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        let idx = ((scores.len() - 1) as f64 * CALIBRATION_PERCENTILE).round() as usize;
        baseline.pivot = scores[idx.min(scores.len() - 1)].max(MIN_PIVOT);

        self.baseline = Some(baseline);
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        let baseline = match &self.baseline {
            Some(b) => b,
            None => return Ok(FallbackPredictor::predict(features)),
        };
        check_feature_vector(features)?;

        let score = baseline.score(features);
        // Scores at twice the pivot map to ~0.88
        let probability = sigmoid(2.0 * (score - baseline.pivot) / baseline.pivot);

        Ok(Forecast {
            probability,
            time_to_failure: estimate_time_to_failure(probability, features),
            confidence: margin_confidence(probability),
            trigger_metrics: trigger_metrics(features),
        })
    }

    fn fork(&self) -> Box<dyn Predictor> {
        Box::new(self.clone())
    }
}
