//! Heuristic scoring used before a model has been trained

use super::features::index;
use super::math::{estimate_time_to_failure, trigger_metrics};
use super::Forecast;
use crate::models::FeatureVector;

/// Confidence reported for heuristic forecasts
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Fallback predictor that uses simple load heuristics when no model is available
pub struct FallbackPredictor;

impl FallbackPredictor {
    /// Weighted load score in [0, 1] from the window means and trends
    pub fn predict(features: &FeatureVector) -> Forecast {
        let cpu = (features.get(index::CPU_MEAN) / 100.0).clamp(0.0, 1.0);
        let memory = (features.get(index::MEMORY_MEAN) / 100.0).clamp(0.0, 1.0);
        let latency = (features.get(index::LATENCY_MEAN) / 1000.0).clamp(0.0, 1.0);
        let errors = (features.get(index::ERROR_RATE_MEAN) / 10.0).clamp(0.0, 1.0);
        let rising = [index::CPU_TREND, index::MEMORY_TREND, index::ERROR_RATE_TREND]
            .iter()
            .filter(|&&i| features.get(i) > 0.0)
            .count() as f64
            / 3.0;

        let probability =
            (cpu * 0.3 + memory * 0.25 + latency * 0.15 + errors * 0.2 + rising * 0.1)
                .clamp(0.0, 1.0);

        Forecast {
            probability,
            time_to_failure: estimate_time_to_failure(probability, features),
            confidence: FALLBACK_CONFIDENCE,
            trigger_metrics: trigger_metrics(features),
        }
    }
}
