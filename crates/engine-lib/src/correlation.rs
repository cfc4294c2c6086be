//! Error-to-metric correlation notes
//!
//! When an error event arrives, the sample in effect at the event time is
//! compared against the samples leading up to it. Metrics more than two
//! standard deviations above that baseline are reported as elevated.

use crate::models::MetricsSample;
use crate::predictor::{mean, population_std_dev};

/// Standard deviations above the baseline mean that count as elevated
const ELEVATION_SIGMAS: f64 = 2.0;

type Accessor = fn(&MetricsSample) -> f64;

const CORRELATED_METRICS: [(&str, Accessor); 5] = [
    ("cpu_usage", |s: &MetricsSample| s.cpu_usage),
    ("memory_usage", |s: &MetricsSample| s.memory_usage),
    ("network_latency", |s: &MetricsSample| s.network_latency),
    ("error_rate", |s: &MetricsSample| s.error_rate),
    ("response_time", |s: &MetricsSample| s.response_time),
];

/// Names of metrics elevated at `at`, judged against at most `baseline`
/// earlier samples. `history` must be in chronological order.
pub fn elevated_metrics(history: &[MetricsSample], at: i64, baseline: usize) -> Vec<String> {
    let upto = history.partition_point(|s| s.timestamp <= at);
    if upto < 2 {
        return Vec::new();
    }
    let current = &history[upto - 1];
    let window = &history[upto.saturating_sub(baseline + 1)..upto - 1];

    CORRELATED_METRICS
        .iter()
        .filter(|(_, value_of)| {
            let values: Vec<f64> = window.iter().map(value_of).collect();
            let avg = mean(&values);
            let value = value_of(current);
            value > avg && value > avg + ELEVATION_SIGMAS * population_std_dev(&values)
        })
        .map(|(name, _)| name.to_string())
        .collect()
}
