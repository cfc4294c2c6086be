//! Model quality bookkeeping
//!
//! After each successful training pass the ensemble is scored against the
//! dataset it was trained on. The resulting figures are an in-sample
//! estimate and are reported with `estimate: true`.

use crate::models::{FeatureVector, ModelPerformance};
use crate::predictor::ModelRegistry;
use tokio::sync::RwLock;

/// Confusion counts for a binary classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Score the ensemble on a labelled dataset. A window counts as a predicted
/// failure when the averaged probability reaches `threshold`.
pub fn evaluate(
    registry: &ModelRegistry,
    features: &[FeatureVector],
    labels: &[u8],
    threshold: f64,
) -> ConfusionCounts {
    let mut counts = ConfusionCounts::default();
    for (vector, label) in features.iter().zip(labels) {
        let predicted = registry
            .ensemble_forecast(vector)
            .map(|(_, forecast)| forecast.probability >= threshold)
            .unwrap_or(false);
        counts.record(predicted, *label == 1);
    }
    counts
}

/// Latest quality figures, replaced after each successful training pass
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    current: RwLock<ModelPerformance>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, counts: &ConfusionCounts, positives: usize, trained_at: i64) {
        let mut current = self.current.write().await;
        *current = ModelPerformance {
            accuracy: counts.accuracy(),
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            last_training: Some(trained_at),
            data_points: counts.total(),
            positive_examples: positives,
            estimate: true,
        };
    }

    pub async fn snapshot(&self) -> ModelPerformance {
        self.current.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_metrics() {
        let mut counts = ConfusionCounts::default();
        // 3 TP, 1 FP, 5 TN, 1 FN
        for _ in 0..3 {
            counts.record(true, true);
        }
        counts.record(true, false);
        for _ in 0..5 {
            counts.record(false, false);
        }
        counts.record(false, true);

        assert_eq!(counts.total(), 10);
        assert!((counts.accuracy() - 0.8).abs() < 1e-12);
        assert!((counts.precision() - 0.75).abs() < 1e-12);
        assert!((counts.recall() - 0.75).abs() < 1e-12);
        assert!((counts.f1() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_gives_zero_precision() {
        let mut counts = ConfusionCounts::default();
        counts.record(false, true);
        counts.record(false, false);
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.f1(), 0.0);
    }

    #[tokio::test]
    async fn test_tracker_starts_empty() {
        let tracker = PerformanceTracker::new();
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.last_training, None);
        assert_eq!(snapshot.data_points, 0);
        assert!(!snapshot.estimate);
    }

    #[tokio::test]
    async fn test_record_marks_estimate() {
        let tracker = PerformanceTracker::new();
        let mut counts = ConfusionCounts::default();
        counts.record(true, true);
        counts.record(false, false);
        tracker.record(&counts, 1, 1_700_000_000).await;

        let snapshot = tracker.snapshot().await;
        assert!(snapshot.estimate);
        assert_eq!(snapshot.accuracy, 1.0);
        assert_eq!(snapshot.data_points, 2);
        assert_eq!(snapshot.positive_examples, 1);
        assert_eq!(snapshot.last_training, Some(1_700_000_000));
    }
}
