//! Feature extraction for failure prediction
//!
//! Turns a window of metrics samples into a fixed-length feature vector:
//! mean, population standard deviation and trend slope for the tracked
//! metrics, cpu/memory extremes, and temporal context of the last sample.

use crate::error::EngineError;
use crate::models::{FeatureVector, MetricsSample};
use chrono::{Datelike, Timelike};

/// Number of features produced per window
pub const NUM_FEATURES: usize = 18;

/// Feature names in vector order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "cpu_mean",
    "cpu_std",
    "cpu_trend",
    "memory_mean",
    "memory_std",
    "memory_trend",
    "latency_mean",
    "latency_std",
    "latency_trend",
    "error_rate_mean",
    "error_rate_std",
    "error_rate_trend",
    "cpu_max",
    "cpu_min",
    "memory_max",
    "memory_min",
    "hour_of_day",
    "day_of_week",
];

/// Indices into the feature vector
pub mod index {
    pub const CPU_MEAN: usize = 0;
    pub const CPU_TREND: usize = 2;
    pub const MEMORY_MEAN: usize = 3;
    pub const MEMORY_TREND: usize = 5;
    pub const LATENCY_MEAN: usize = 6;
    pub const LATENCY_TREND: usize = 8;
    pub const ERROR_RATE_MEAN: usize = 9;
    pub const ERROR_RATE_TREND: usize = 11;
    pub const CPU_MAX: usize = 12;
    pub const MEMORY_MAX: usize = 14;
    pub const HOUR_OF_DAY: usize = 16;
    pub const DAY_OF_WEEK: usize = 17;
}

/// Extracts feature vectors from windows of metrics samples
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features from a chronologically ordered, non-empty window
    pub fn extract(&self, window: &[MetricsSample]) -> Result<FeatureVector, EngineError> {
        let last = window.last().ok_or(EngineError::EmptyWindow)?;

        let cpu: Vec<f64> = window.iter().map(|s| s.cpu_usage).collect();
        let memory: Vec<f64> = window.iter().map(|s| s.memory_usage).collect();
        let latency: Vec<f64> = window.iter().map(|s| s.network_latency).collect();
        let error_rate: Vec<f64> = window.iter().map(|s| s.error_rate).collect();

        let mut values = Vec::with_capacity(NUM_FEATURES);
        for series in [&cpu, &memory, &latency, &error_rate] {
            values.push(mean(series));
            values.push(population_std_dev(series));
            values.push(linear_regression_slope(series));
        }
        values.push(max(&cpu));
        values.push(min(&cpu));
        values.push(max(&memory));
        values.push(min(&memory));

        let (hour, day) = time_of_week(last.timestamp);
        values.push(hour);
        values.push(day);

        debug_assert_eq!(values.len(), NUM_FEATURES);

        Ok(FeatureVector {
            values,
            window_end: last.timestamp,
        })
    }
}

/// Hour of day (0-23) and day of week (0-6, Monday = 0) in UTC
fn time_of_week(timestamp: i64) -> (f64, f64) {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| {
            (
                dt.hour() as f64,
                dt.weekday().num_days_from_monday() as f64,
            )
        })
        .unwrap_or((0.0, 0.0))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Ordinary least squares slope over the index sequence 0..n-1
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
