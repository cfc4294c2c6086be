//! Bounded rolling history of metrics samples and error events
//!
//! Both streams are FIFO ring buffers with independent caps. Eviction drops
//! all excess entries in a single drain rather than one at a time.

use crate::error::EngineError;
use crate::models::{ErrorEvent, MetricsSample};
use crate::training::MIN_TRAINING_EXAMPLES;
use std::collections::VecDeque;

/// Maximum retained metrics samples (24 hours at 1 sample/minute)
pub const MAX_METRIC_SAMPLES: usize = 1440;

/// Error history cap; exceeding it trims to [`ERROR_TRIM_SIZE`]
pub const MAX_ERROR_EVENTS: usize = 10_000;

/// Number of error events kept after a trim
pub const ERROR_TRIM_SIZE: usize = 5_000;

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub max_metrics: usize,
    pub max_errors: usize,
    pub error_trim_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_metrics: MAX_METRIC_SAMPLES,
            max_errors: MAX_ERROR_EVENTS,
            error_trim_size: ERROR_TRIM_SIZE,
        }
    }
}

impl HistoryConfig {
    /// Reject caps too small to ever fill a feature window of `window_size`
    /// or to yield enough windows for a training pass
    pub fn validate_for_window(&self, window_size: usize) -> Result<(), EngineError> {
        if self.max_metrics == 0 {
            return Err(EngineError::InvalidConfig(
                "max_metric_samples must be positive".to_string(),
            ));
        }
        if window_size > self.max_metrics {
            return Err(EngineError::InvalidConfig(format!(
                "window_size {} exceeds max_metric_samples {}",
                window_size, self.max_metrics
            )));
        }
        let needed = window_size + MIN_TRAINING_EXAMPLES - 1;
        if self.max_metrics < needed {
            return Err(EngineError::InvalidConfig(format!(
                "max_metric_samples {} leaves no room for training; need at least {} for window_size {}",
                self.max_metrics, needed, window_size
            )));
        }
        Ok(())
    }
}

/// Append-only, FIFO-evicting storage for the two input streams
#[derive(Debug)]
pub struct RollingHistory {
    metrics: VecDeque<MetricsSample>,
    errors: VecDeque<ErrorEvent>,
    config: HistoryConfig,
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHistory {
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        let error_trim_size = config.error_trim_size.min(config.max_errors);
        Self {
            metrics: VecDeque::with_capacity(config.max_metrics + 1),
            errors: VecDeque::new(),
            config: HistoryConfig {
                error_trim_size,
                ..config
            },
        }
    }

    /// Append a sample, evicting the oldest excess
    pub fn append_metric(&mut self, sample: MetricsSample) {
        self.metrics.push_back(sample);
        if self.metrics.len() > self.config.max_metrics {
            let excess = self.metrics.len() - self.config.max_metrics;
            self.metrics.drain(..excess);
        }
    }

    /// Append an error event, trimming to the newest `error_trim_size`
    /// entries once the cap is exceeded
    pub fn append_error(&mut self, event: ErrorEvent) {
        self.errors.push_back(event);
        if self.errors.len() > self.config.max_errors {
            let excess = self.errors.len() - self.config.error_trim_size;
            self.errors.drain(..excess);
        }
    }

    /// Most recent `n` samples in chronological order. Fewer than `n` means
    /// there is not enough data yet.
    pub fn window(&self, n: usize) -> Vec<MetricsSample> {
        let start = self.metrics.len().saturating_sub(n);
        self.metrics.range(start..).cloned().collect()
    }

    /// The sample in effect at `at` plus up to `lookback` samples before it
    pub fn metrics_up_to(&self, at: i64, lookback: usize) -> Vec<MetricsSample> {
        let upto = self.metrics.partition_point(|s| s.timestamp <= at);
        let start = upto.saturating_sub(lookback + 1);
        self.metrics.range(start..upto).cloned().collect()
    }

    pub fn metrics_snapshot(&self) -> Vec<MetricsSample> {
        self.metrics.iter().cloned().collect()
    }

    pub fn errors_snapshot(&self) -> Vec<ErrorEvent> {
        self.errors.iter().cloned().collect()
    }

    /// Error events with `timestamp >= since`
    pub fn errors_since(&self, since: i64) -> Vec<ErrorEvent> {
        self.errors
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn metrics_len(&self) -> usize {
        self.metrics.len()
    }

    pub fn errors_len(&self) -> usize {
        self.errors.len()
    }
}
