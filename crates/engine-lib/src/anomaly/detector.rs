//! Threshold-based anomaly check run on every ingested sample
//!
//! Independent of any trained model: a breach of a fixed threshold turns
//! straight into a performance-degradation prediction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AnomalyThresholds;
use crate::models::{FailurePrediction, MetricsSample, PredictionSeverity, PredictionType};

/// Probability assigned to every threshold-breach prediction
pub const ANOMALY_PROBABILITY: f64 = 0.8;

/// Confidence assigned to every threshold-breach prediction
pub const ANOMALY_CONFIDENCE: f64 = 0.75;

/// Minutes until failure assumed for a threshold breach
pub const ANOMALY_TIME_TO_FAILURE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    HighCpu,
    HighMemory,
    HighLatency,
    HighErrorRate,
    SlowResponse,
}

impl BreachKind {
    /// Sample field the breach was measured on
    pub fn metric(&self) -> &'static str {
        match self {
            BreachKind::HighCpu => "cpu_usage",
            BreachKind::HighMemory => "memory_usage",
            BreachKind::HighLatency => "network_latency",
            BreachKind::HighErrorRate => "error_rate",
            BreachKind::SlowResponse => "response_time",
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            BreachKind::HighCpu => "Scale out compute capacity or shed non-critical load",
            BreachKind::HighMemory => "Free memory by restarting leaking workers or adding capacity",
            BreachKind::HighLatency => "Check network links and fail over to a healthy route",
            BreachKind::HighErrorRate => "Inspect recent error logs and roll back the latest change",
            BreachKind::SlowResponse => "Throttle incoming requests and check downstream services",
        }
    }
}

/// A single threshold crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub kind: BreachKind,
    pub value: f64,
    pub threshold: f64,
}

impl Breach {
    pub fn description(&self) -> String {
        match self.kind {
            BreachKind::HighCpu => format!("High CPU usage: {:.1}%", self.value),
            BreachKind::HighMemory => format!("High memory usage: {:.1}%", self.value),
            BreachKind::HighLatency => format!("High network latency: {:.0}ms", self.value),
            BreachKind::HighErrorRate => format!("High error rate: {:.1}%", self.value),
            BreachKind::SlowResponse => format!("Slow response time: {:.0}ms", self.value),
        }
    }
}

pub struct RealTimeAnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl RealTimeAnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Every threshold the sample strictly exceeds, in a fixed order
    pub fn breaches(&self, sample: &MetricsSample) -> Vec<Breach> {
        let t = &self.thresholds;
        [
            (BreachKind::HighCpu, sample.cpu_usage, t.cpu_usage),
            (BreachKind::HighMemory, sample.memory_usage, t.memory_usage),
            (BreachKind::HighLatency, sample.network_latency, t.network_latency),
            (BreachKind::HighErrorRate, sample.error_rate, t.error_rate),
            (BreachKind::SlowResponse, sample.response_time, t.response_time),
        ]
        .into_iter()
        .filter(|(_, value, threshold)| value > threshold)
        .map(|(kind, value, threshold)| Breach {
            kind,
            value,
            threshold,
        })
        .collect()
    }

    /// Prediction for a sample, or `None` when nothing is breached
    pub fn detect(&self, sample: &MetricsSample) -> Option<(FailurePrediction, Vec<Breach>)> {
        let breaches = self.breaches(sample);
        if breaches.is_empty() {
            return None;
        }

        let trigger_metrics: BTreeMap<String, f64> = breaches
            .iter()
            .map(|b| (b.kind.metric().to_string(), b.value))
            .collect();

        let prediction = FailurePrediction {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: sample.timestamp,
            prediction_type: PredictionType::PerformanceDegradation,
            probability: ANOMALY_PROBABILITY,
            time_to_failure: ANOMALY_TIME_TO_FAILURE,
            affected_components: breaches.iter().map(Breach::description).collect(),
            severity: PredictionSeverity::from_probability(ANOMALY_PROBABILITY),
            recommended_actions: breaches.iter().map(|b| b.kind.action().to_string()).collect(),
            confidence: ANOMALY_CONFIDENCE,
            trigger_metrics,
        };
        Some((prediction, breaches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> MetricsSample {
        MetricsSample {
            timestamp: 1_700_000_000,
            cpu_usage: 50.0,
            memory_usage: 60.0,
            network_latency: 40.0,
            active_connections: 20.0,
            error_rate: 0.5,
            response_time: 200.0,
            temperature: 45.0,
            disk_usage: 50.0,
        }
    }

    fn detector() -> RealTimeAnomalyDetector {
        RealTimeAnomalyDetector::new(AnomalyThresholds::default())
    }

    #[test]
    fn test_calm_sample_has_no_breach() {
        assert!(detector().detect(&calm()).is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut sample = calm();
        sample.cpu_usage = 90.0;
        assert!(detector().detect(&sample).is_none());
    }

    #[test]
    fn test_cpu_breach_builds_degradation_prediction() {
        let mut sample = calm();
        sample.cpu_usage = 99.0;
        let (prediction, breaches) = detector().detect(&sample).unwrap();

        assert_eq!(breaches.len(), 1);
        assert_eq!(prediction.prediction_type, PredictionType::PerformanceDegradation);
        assert_eq!(prediction.probability, ANOMALY_PROBABILITY);
        assert_eq!(prediction.confidence, ANOMALY_CONFIDENCE);
        assert_eq!(prediction.time_to_failure, ANOMALY_TIME_TO_FAILURE);
        assert_eq!(prediction.severity, PredictionSeverity::High);
        assert_eq!(prediction.affected_components, vec!["High CPU usage: 99.0%"]);
        assert_eq!(prediction.trigger_metrics["cpu_usage"], 99.0);
        assert_eq!(prediction.timestamp, sample.timestamp);
    }

    #[test]
    fn test_actions_map_one_to_one() {
        let mut sample = calm();
        sample.memory_usage = 97.0;
        sample.network_latency = 1500.0;
        sample.response_time = 6000.0;
        let (prediction, breaches) = detector().detect(&sample).unwrap();

        let kinds: Vec<BreachKind> = breaches.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![BreachKind::HighMemory, BreachKind::HighLatency, BreachKind::SlowResponse]
        );
        assert_eq!(prediction.recommended_actions.len(), 3);
        assert_eq!(prediction.recommended_actions[1], BreachKind::HighLatency.action());
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = RealTimeAnomalyDetector::new(AnomalyThresholds {
            error_rate: 0.1,
            ..Default::default()
        });
        let (_, breaches) = detector.detect(&calm()).unwrap();
        assert_eq!(breaches[0].kind, BreachKind::HighErrorRate);
        assert_eq!(breaches[0].threshold, 0.1);
    }
}
