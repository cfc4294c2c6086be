//! Numeric helpers shared by the model kinds

use super::features::{index, FEATURE_NAMES, NUM_FEATURES};
use crate::models::FeatureVector;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Lower bound for any time-to-failure estimate, in minutes
const MIN_TIME_TO_FAILURE: f64 = 1.0;

/// Upper bound for any time-to-failure estimate (24 hours), in minutes
const MAX_TIME_TO_FAILURE: f64 = 24.0 * 60.0;

/// Features reported as evidence alongside a forecast
const TRIGGER_FEATURES: [usize; 8] = [
    index::CPU_MEAN,
    index::CPU_TREND,
    index::MEMORY_MEAN,
    index::MEMORY_TREND,
    index::LATENCY_MEAN,
    index::ERROR_RATE_MEAN,
    index::CPU_MAX,
    index::MEMORY_MAX,
];

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Confidence grows with distance from the decision boundary
pub(crate) fn margin_confidence(probability: f64) -> f64 {
    (0.5 + (probability - 0.5).abs()).clamp(0.0, 1.0)
}

/// Validate training input and return the number of positive labels
pub(crate) fn check_training_input(features: &[FeatureVector], labels: &[u8]) -> Result<usize> {
    if features.is_empty() {
        bail!("Training set is empty");
    }
    if features.len() != labels.len() {
        bail!(
            "Training set has {} feature vectors but {} labels",
            features.len(),
            labels.len()
        );
    }
    if let Some(bad) = features.iter().position(|f| f.len() != NUM_FEATURES) {
        bail!(
            "Feature vector {} has {} values, expected {}",
            bad,
            features[bad].len(),
            NUM_FEATURES
        );
    }
    if features
        .iter()
        .any(|f| f.values.iter().any(|v| !v.is_finite()))
    {
        bail!("Training set contains non-finite feature values");
    }
    if let Some(bad) = labels.iter().find(|l| **l > 1) {
        bail!("Label {} is not binary", bad);
    }
    Ok(labels.iter().filter(|l| **l == 1).count())
}

/// Laplace-smoothed failure rate when only one class was observed. A
/// classifier trained on such a set predicts this constant until both
/// failure and healthy windows are available.
pub(crate) fn single_class_rate(positives: usize, total: usize) -> Option<f64> {
    (positives == 0 || positives == total)
        .then(|| (positives as f64 + 1.0) / (total as f64 + 2.0))
}

pub(crate) fn check_feature_vector(features: &FeatureVector) -> Result<()> {
    if features.len() != NUM_FEATURES {
        bail!(
            "Feature vector has {} values, expected {}",
            features.len(),
            NUM_FEATURES
        );
    }
    if features.values.iter().any(|v| !v.is_finite()) {
        bail!("Feature vector contains non-finite values");
    }
    Ok(())
}

/// Scales never drop below this share of the feature's magnitude
const RELATIVE_SCALE_FLOOR: f64 = 0.1;

/// Absolute scale floor for features centered on zero
const ABSOLUTE_SCALE_FLOOR: f64 = 1e-3;

/// Per-feature standardization learned from a training set
#[derive(Debug, Clone)]
pub(crate) struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a FeatureVector>) -> Self {
        let mut count = 0usize;
        let mut sums = vec![0.0; NUM_FEATURES];
        let mut sums_sq = vec![0.0; NUM_FEATURES];
        for row in rows {
            count += 1;
            for (j, v) in row.values.iter().enumerate().take(NUM_FEATURES) {
                sums[j] += v;
                sums_sq[j] += v * v;
            }
        }
        let n = count.max(1) as f64;
        let means: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let scales = sums_sq
            .iter()
            .zip(&means)
            .map(|(sq, m)| {
                let var = (sq / n - m * m).max(0.0);
                var.sqrt()
                    .max(RELATIVE_SCALE_FLOOR * m.abs())
                    .max(ABSOLUTE_SCALE_FLOOR)
            })
            .collect();
        Self { means, scales }
    }

    pub fn transform(&self, features: &FeatureVector) -> Vec<f64> {
        features
            .values
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Compensated (Neumaier) summation for order-stable averages
#[derive(Debug, Clone, Copy, Default)]
pub struct NeumaierSum {
    sum: f64,
    compensation: f64,
}

impl NeumaierSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn total(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Minutes until failure for a given probability.
///
/// Starts from a probability-scaled horizon and shortens it when cpu or
/// memory are trending towards saturation (samples are taken once a minute).
pub fn estimate_time_to_failure(probability: f64, features: &FeatureVector) -> f64 {
    let mut minutes = 5.0 + (1.0 - probability.clamp(0.0, 1.0)) * 115.0;

    for (max_idx, trend_idx) in [
        (index::CPU_MAX, index::CPU_TREND),
        (index::MEMORY_MAX, index::MEMORY_TREND),
    ] {
        let trend = features.get(trend_idx);
        if trend > f64::EPSILON {
            let headroom = (100.0 - features.get(max_idx)).max(0.0);
            minutes = minutes.min(headroom / trend);
        }
    }

    minutes.clamp(MIN_TIME_TO_FAILURE, MAX_TIME_TO_FAILURE)
}

/// Named feature values reported as evidence for a forecast
pub fn trigger_metrics(features: &FeatureVector) -> BTreeMap<String, f64> {
    TRIGGER_FEATURES
        .iter()
        .map(|&i| (FEATURE_NAMES[i].to_string(), features.get(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(cpu_max: f64, cpu_trend: f64) -> FeatureVector {
        let mut values = vec![0.0; NUM_FEATURES];
        values[index::CPU_MAX] = cpu_max;
        values[index::CPU_TREND] = cpu_trend;
        FeatureVector {
            values,
            window_end: 1,
        }
    }

    #[test]
    fn test_neumaier_sum_is_order_stable() {
        let values = [1e16, 1.0, -1e16, 1.0];
        let mut forward = NeumaierSum::new();
        values.iter().for_each(|v| forward.add(*v));
        let mut backward = NeumaierSum::new();
        values.iter().rev().for_each(|v| backward.add(*v));
        assert_eq!(forward.total(), 2.0);
        assert_eq!(backward.total(), 2.0);
    }

    #[test]
    fn test_time_to_failure_shrinks_with_probability() {
        let flat = vector(50.0, 0.0);
        assert!(estimate_time_to_failure(0.9, &flat) < estimate_time_to_failure(0.2, &flat));
    }

    #[test]
    fn test_time_to_failure_uses_saturation_trend() {
        // 20% headroom at 2% per minute
        let rising = vector(80.0, 2.0);
        assert!((estimate_time_to_failure(0.1, &rising) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_to_failure_is_bounded() {
        let saturated = vector(100.0, 5.0);
        assert_eq!(estimate_time_to_failure(0.5, &saturated), MIN_TIME_TO_FAILURE);
    }

    #[test]
    fn test_trigger_metrics_are_named() {
        let metrics = trigger_metrics(&vector(70.0, 0.5));
        assert_eq!(metrics.len(), TRIGGER_FEATURES.len());
        assert_eq!(metrics["cpu_max"], 70.0);
        assert_eq!(metrics["cpu_trend"], 0.5);
    }

    #[test]
    fn test_check_training_input_counts_positives() {
        let rows = vec![vector(1.0, 0.0), vector(2.0, 0.0), vector(3.0, 0.0)];
        assert_eq!(check_training_input(&rows, &[0, 1, 1]).unwrap(), 2);
        assert!(check_training_input(&rows, &[0, 2, 1]).is_err());
        assert!(check_training_input(&[], &[]).is_err());
    }

    #[test]
    fn test_standardizer_centers_values() {
        let rows = vec![vector(10.0, 0.0), vector(30.0, 0.0)];
        let scaler = Standardizer::fit(&rows);
        let z = scaler.transform(&rows[1]);
        assert!((z[index::CPU_MAX] - 1.0).abs() < 1e-9);
        assert_eq!(z[0], 0.0);
    }

    #[test]
    fn test_standardizer_scale_follows_magnitude_of_constant_feature() {
        let rows = vec![vector(60.0, 0.0), vector(60.0, 0.0)];
        let scaler = Standardizer::fit(&rows);
        // 10% of 60
        let z = scaler.transform(&vector(54.0, 0.0));
        assert!((z[index::CPU_MAX] + 1.0).abs() < 1e-9);
        // Zero-centered constant feature falls back to the absolute floor
        let z = scaler.transform(&vector(60.0, 0.002));
        assert!((z[index::CPU_TREND] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_rate() {
        assert_eq!(single_class_rate(0, 98), Some(0.01));
        assert_eq!(single_class_rate(98, 98), Some(0.99));
        assert_eq!(single_class_rate(3, 98), None);
    }
}
