//! Sequence-pattern predictor
//!
//! Learns the typical standardized feature pattern of windows that preceded
//! a failure and of windows that did not, and scores new windows by their
//! relative distance to the two patterns.

use super::math::{
    check_feature_vector, check_training_input, estimate_time_to_failure, margin_confidence,
    single_class_rate, trigger_metrics, Standardizer,
};
use super::{FallbackPredictor, Forecast, Predictor};
use crate::config::ModelKind;
use crate::models::FeatureVector;
use anyhow::Result;

#[derive(Debug, Clone)]
enum PatternModel {
    /// Only one class seen so far; every window scores the base rate
    Constant(f64),
    Centroids {
        scaler: Standardizer,
        failure_centroid: Vec<f64>,
        healthy_centroid: Vec<f64>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SequencePatternPredictor {
    model: Option<PatternModel>,
}

impl SequencePatternPredictor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn centroid(rows: &[Vec<f64>]) -> Vec<f64> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut sums = vec![0.0; width];
    for row in rows {
        for (s, v) in sums.iter_mut().zip(row) {
            *s += v;
        }
    }
    let n = rows.len().max(1) as f64;
    sums.into_iter().map(|s| s / n).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

impl Predictor for SequencePatternPredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::SequencePattern
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn train(&mut self, features: &[FeatureVector], labels: &[u8]) -> Result<()> {
        let positives = check_training_input(features, labels)?;
        if let Some(rate) = single_class_rate(positives, labels.len()) {
            self.model = Some(PatternModel::Constant(rate));
            return Ok(());
        }

        let scaler = Standardizer::fit(features);
        let (failing, healthy): (Vec<_>, Vec<_>) = features
            .iter()
            .zip(labels)
            .map(|(f, l)| (scaler.transform(f), *l))
            .partition(|(_, l)| *l == 1);

        let failing: Vec<Vec<f64>> = failing.into_iter().map(|(row, _)| row).collect();
        let healthy: Vec<Vec<f64>> = healthy.into_iter().map(|(row, _)| row).collect();

        self.model = Some(PatternModel::Centroids {
            scaler,
            failure_centroid: centroid(&failing),
            healthy_centroid: centroid(&healthy),
        });
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        let model = match &self.model {
            Some(m) => m,
            None => return Ok(FallbackPredictor::predict(features)),
        };
        check_feature_vector(features)?;

        let probability = match model {
            PatternModel::Constant(rate) => *rate,
            PatternModel::Centroids {
                scaler,
                failure_centroid,
                healthy_centroid,
            } => {
                let row = scaler.transform(features);
                let to_failure = distance(&row, failure_centroid);
                let to_healthy = distance(&row, healthy_centroid);
                let total = to_failure + to_healthy;
                if total < f64::EPSILON {
                    0.5
                } else {
                    (to_healthy / total).clamp(0.0, 1.0)
                }
            }
        };

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
