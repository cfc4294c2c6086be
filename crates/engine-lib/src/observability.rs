//! Observability infrastructure for the failure prediction engine
//!
//! Provides:
//! - Prometheus metrics (ingest latency, prediction cycle latency, training duration, history size)
//! - Structured JSON logging with tracing

use crate::models::{FailurePrediction, PredictionSeverity};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Training passes take much longer than a single ingest
const TRAINING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    ingest_latency_seconds: Histogram,
    prediction_cycle_seconds: Histogram,
    training_duration_seconds: Histogram,
    history_metric_samples: IntGauge,
    history_error_events: IntGauge,
    predictions_exposed: IntGauge,
    model_trained: GaugeVec,
    anomalies_detected: IntCounter,
    training_runs: IntCounter,
    training_failures: IntCounter,
    rejected_inputs: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            ingest_latency_seconds: register_histogram!(
                "fpe_ingest_latency_seconds",
                "Time spent appending a metrics sample and running the anomaly check",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_latency_seconds"),

            prediction_cycle_seconds: register_histogram!(
                "fpe_prediction_cycle_seconds",
                "Time spent running one full prediction cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_cycle_seconds"),

            training_duration_seconds: register_histogram!(
                "fpe_training_duration_seconds",
                "Time spent training every registered predictor",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            history_metric_samples: register_int_gauge!(
                "fpe_history_metric_samples",
                "Number of metrics samples held in the rolling history"
            )
            .expect("Failed to register history_metric_samples"),

            history_error_events: register_int_gauge!(
                "fpe_history_error_events",
                "Number of error events held in the rolling history"
            )
            .expect("Failed to register history_error_events"),

            predictions_exposed: register_int_gauge!(
                "fpe_predictions_exposed",
                "Number of failure predictions currently exposed"
            )
            .expect("Failed to register predictions_exposed"),

            model_trained: register_gauge_vec!(
                "fpe_model_trained",
                "Whether the predictor for a component has been trained (1) or not (0)",
                &["component", "kind"]
            )
            .expect("Failed to register model_trained"),

            anomalies_detected: register_int_counter!(
                "fpe_anomalies_detected_total",
                "Total number of threshold breaches detected on ingest"
            )
            .expect("Failed to register anomalies_detected"),

            training_runs: register_int_counter!(
                "fpe_training_runs_total",
                "Total number of training passes started"
            )
            .expect("Failed to register training_runs"),

            training_failures: register_int_counter!(
                "fpe_training_failures_total",
                "Total number of training passes where at least one predictor failed"
            )
            .expect("Failed to register training_failures"),

            rejected_inputs: register_int_counter_vec!(
                "fpe_rejected_inputs_total",
                "Total number of samples or events rejected at validation",
                &["kind"]
            )
            .expect("Failed to register rejected_inputs"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the process-wide metrics. Clones share the same
/// underlying collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        self.inner().ingest_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_cycle(&self, duration_secs: f64) {
        self.inner().prediction_cycle_seconds.observe(duration_secs);
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn set_history_size(&self, metric_samples: usize, error_events: usize) {
        self.inner()
            .history_metric_samples
            .set(metric_samples as i64);
        self.inner().history_error_events.set(error_events as i64);
    }

    pub fn set_predictions_exposed(&self, count: usize) {
        self.inner().predictions_exposed.set(count as i64);
    }

    pub fn set_model_trained(&self, component: &str, kind: &str, trained: bool) {
        self.inner()
            .model_trained
            .with_label_values(&[component, kind])
            .set(if trained { 1.0 } else { 0.0 });
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_training_runs(&self) {
        self.inner().training_runs.inc();
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    /// `kind` is either "metric" or "error"
    pub fn inc_rejected_input(&self, kind: &str) {
        self.inner().rejected_inputs.with_label_values(&[kind]).inc();
    }
}

/// Structured logger for engine events
///
/// Every significant event carries an `event` field so log pipelines can
/// filter on it without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a model-based failure prediction
    pub fn log_prediction(&self, prediction: &FailurePrediction) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            prediction_id = %prediction.id,
            prediction_type = %prediction.prediction_type,
            probability = prediction.probability,
            confidence = prediction.confidence,
            time_to_failure_minutes = prediction.time_to_failure,
            severity = %prediction.severity,
            components = ?prediction.affected_components,
            "Failure predicted"
        );
    }

    /// Log a threshold breach found on ingest
    pub fn log_anomaly(&self, prediction: &FailurePrediction) {
        match prediction.severity {
            PredictionSeverity::Critical | PredictionSeverity::High => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    prediction_id = %prediction.id,
                    severity = %prediction.severity,
                    probability = prediction.probability,
                    triggers = ?prediction.trigger_metrics,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    prediction_id = %prediction.id,
                    severity = %prediction.severity,
                    probability = prediction.probability,
                    triggers = ?prediction.trigger_metrics,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log the end of a training pass
    pub fn log_training(
        &self,
        success: bool,
        examples: usize,
        positives: usize,
        failed_components: &[String],
        duration_secs: f64,
    ) {
        if success {
            info!(
                event = "training_completed",
                instance = %self.instance,
                examples = examples,
                positives = positives,
                duration_secs = duration_secs,
                "Model training completed"
            );
        } else {
            warn!(
                event = "training_failed",
                instance = %self.instance,
                examples = examples,
                positives = positives,
                failed_components = ?failed_components,
                duration_secs = duration_secs,
                "Model training failed for some components, keeping previous models"
            );
        }
    }

    /// Log a training pass skipped for lack of history
    pub fn log_training_skipped(&self, needed: usize, have: usize) {
        info!(
            event = "training_skipped",
            instance = %self.instance,
            needed = needed,
            have = have,
            "Insufficient data for training"
        );
    }

    /// Log how an error event lines up with the metrics around it
    pub fn log_error_correlation(
        &self,
        event_id: &str,
        component: &str,
        elevated_metrics: &[String],
    ) {
        if elevated_metrics.is_empty() {
            info!(
                event = "error_correlated",
                instance = %self.instance,
                event_id = %event_id,
                component = %component,
                "Error event recorded, no metric elevated at event time"
            );
        } else {
            warn!(
                event = "error_correlated",
                instance = %self.instance,
                event_id = %event_id,
                component = %component,
                elevated_metrics = ?elevated_metrics,
                "Error event coincides with elevated metrics"
            );
        }
    }

    pub fn log_startup(&self, version: &str, components: &[String]) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            engine_version = %version,
            components = ?components,
            "Failure prediction engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Failure prediction engine shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_handles_share_registry() {
        let a = EngineMetrics::new();
        let b = a.clone();
        a.observe_ingest_latency(0.001);
        b.observe_prediction_cycle(0.02);
        a.observe_training_duration(1.5);
        a.set_history_size(10, 2);
        b.set_predictions_exposed(3);
        a.set_model_trained("network", "tree_ensemble", true);
        a.inc_anomalies_detected();
        a.inc_training_runs();
        a.inc_training_failures();
        b.inc_rejected_input("metric");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "fpe_rejected_inputs_total"));
    }

    #[test]
    fn test_structured_logger_instance() {
        let logger = StructuredLogger::new("edge-01");
        assert_eq!(logger.instance(), "edge-01");
    }
}
