//! Per-component model registry and ensemble combination
//!
//! Each monitored subsystem owns one predictor slot. Training happens on a
//! forked copy that is swapped into the slot only when it succeeds.

use super::math::NeumaierSum;
use super::{build_predictor, Forecast, Predictor};
use crate::config::{ModelConfig, ModelKind};
use crate::error::EngineError;
use crate::models::{FailurePrediction, FeatureVector, PredictionSeverity, PredictionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// A named predictor guarded for concurrent inference and atomic swaps
pub struct PredictorSlot {
    kind: ModelKind,
    predictor: RwLock<Box<dyn Predictor>>,
}

impl PredictorSlot {
    pub fn new(predictor: Box<dyn Predictor>) -> Self {
        Self {
            kind: predictor.kind(),
            predictor: RwLock::new(predictor),
        }
    }

    fn predict(&self, features: &FeatureVector) -> anyhow::Result<Forecast> {
        let predictor = self
            .predictor
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        predictor.predict(features)
    }

    fn is_trained(&self) -> bool {
        self.predictor
            .read()
            .map(|p| p.is_trained())
            .unwrap_or(false)
    }

    /// Train a private copy and swap it in on success
    fn train(&self, features: &[FeatureVector], labels: &[u8]) -> anyhow::Result<()> {
        let mut candidate = {
            let current = self
                .predictor
                .read()
                .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
            current.fork()
        };

        candidate.train(features, labels)?;

        let mut slot = self
            .predictor
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        *slot = candidate;
        Ok(())
    }
}

/// Outcome of training one component's predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub component: String,
    pub kind: ModelKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry entry summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub component: String,
    pub kind: ModelKind,
    pub trained: bool,
}

/// Owns one predictor per monitored component
pub struct ModelRegistry {
    slots: BTreeMap<String, PredictorSlot>,
    confidence_threshold: f64,
}

impl ModelRegistry {
    /// Empty registry; components are added with [`ModelRegistry::register`]
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            slots: BTreeMap::new(),
            confidence_threshold,
        }
    }

    /// Registry with one untrained predictor per configured component
    pub fn from_config(config: &ModelConfig) -> Self {
        let mut registry = Self::new(config.confidence_threshold);
        for component in &config.components {
            registry.register(component, build_predictor(config.model_for(component)));
        }
        registry
    }

    pub fn register(&mut self, component: impl Into<String>, predictor: Box<dyn Predictor>) {
        self.slots
            .insert(component.into(), PredictorSlot::new(predictor));
    }

    pub fn component_names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        self.slots
            .iter()
            .map(|(name, slot)| ModelStatus {
                component: name.clone(),
                kind: slot.kind,
                trained: slot.is_trained(),
            })
            .collect()
    }

    /// Component-level prediction, returned only above the confidence threshold
    pub fn predict_component(
        &self,
        component: &str,
        features: &FeatureVector,
    ) -> Result<Option<FailurePrediction>, EngineError> {
        let slot = self
            .slots
            .get(component)
            .ok_or_else(|| EngineError::UnknownComponent(component.to_string()))?;

        let forecast = slot.predict(features).map_err(|e| EngineError::Model {
            component: component.to_string(),
            message: e.to_string(),
        })?;

        if forecast.probability < self.confidence_threshold {
            debug!(
                component = %component,
                probability = forecast.probability,
                threshold = self.confidence_threshold,
                "Component forecast below confidence threshold"
            );
            return Ok(None);
        }

        let components = vec![component.to_string()];
        Ok(Some(build_prediction(
            PredictionType::ComponentFailure,
            &forecast,
            components,
        )))
    }

    /// Average forecast across every predictor that succeeded, with the
    /// names of the contributing components. Failing predictors are skipped.
    pub fn ensemble_forecast(&self, features: &FeatureVector) -> Option<(Vec<String>, Forecast)> {
        let mut contributors = Vec::with_capacity(self.slots.len());
        let mut probability = NeumaierSum::new();
        let mut time_to_failure = NeumaierSum::new();
        let mut confidence = NeumaierSum::new();
        let mut triggers: BTreeMap<String, (NeumaierSum, usize)> = BTreeMap::new();

        for (name, slot) in &self.slots {
            match slot.predict(features) {
                Ok(forecast) => {
                    probability.add(forecast.probability);
                    time_to_failure.add(forecast.time_to_failure);
                    confidence.add(forecast.confidence);
                    for (metric, value) in &forecast.trigger_metrics {
                        let entry = triggers
                            .entry(metric.clone())
                            .or_insert_with(|| (NeumaierSum::new(), 0));
                        entry.0.add(*value);
                        entry.1 += 1;
                    }
                    contributors.push(name.clone());
                }
                Err(e) => {
                    warn!(component = %name, error = %e, "Predictor failed, excluded from ensemble");
                }
            }
        }

        if contributors.is_empty() {
            return None;
        }

        let n = contributors.len() as f64;
        let forecast = Forecast {
            probability: (probability.total() / n).clamp(0.0, 1.0),
            time_to_failure: time_to_failure.total() / n,
            confidence: (confidence.total() / n).clamp(0.0, 1.0),
            trigger_metrics: triggers
                .into_iter()
                .map(|(metric, (sum, count))| (metric, sum.total() / count as f64))
                .collect(),
        };
        Some((contributors, forecast))
    }

    /// System-level prediction from the averaged ensemble forecast
    pub fn predict_ensemble(&self, features: &FeatureVector) -> Option<FailurePrediction> {
        let (contributors, forecast) = self.ensemble_forecast(features)?;
        if forecast.probability < self.confidence_threshold {
            debug!(
                probability = forecast.probability,
                contributors = contributors.len(),
                "Ensemble forecast below confidence threshold"
            );
            return None;
        }
        Some(build_prediction(
            PredictionType::SystemFailure,
            &forecast,
            contributors,
        ))
    }

    /// Train every predictor on the same dataset, in component order
    pub fn train_all(&self, features: &[FeatureVector], labels: &[u8]) -> Vec<TrainingResult> {
        self.slots
            .iter()
            .map(|(name, slot)| match slot.train(features, labels) {
                Ok(()) => TrainingResult {
                    component: name.clone(),
                    kind: slot.kind,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    warn!(component = %name, kind = %slot.kind, error = %e, "Model training failed");
                    TrainingResult {
                        component: name.clone(),
                        kind: slot.kind,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }
}

fn build_prediction(
    prediction_type: PredictionType,
    forecast: &Forecast,
    affected_components: Vec<String>,
) -> FailurePrediction {
    FailurePrediction {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        prediction_type,
        probability: forecast.probability,
        time_to_failure: forecast.time_to_failure,
        recommended_actions: recommended_actions(prediction_type, forecast, &affected_components),
        affected_components,
        severity: PredictionSeverity::from_probability(forecast.probability),
        confidence: forecast.confidence,
        trigger_metrics: forecast.trigger_metrics.clone(),
    }
}

/// Remediation hints derived from the evidence behind a forecast
fn recommended_actions(
    prediction_type: PredictionType,
    forecast: &Forecast,
    components: &[String],
) -> Vec<String> {
    let metric = |name: &str| forecast.trigger_metrics.get(name).copied().unwrap_or(0.0);
    let target = components.join(", ");
    let mut actions = Vec::new();

    if metric("cpu_mean") >= 80.0 || metric("cpu_trend") > 0.5 {
        actions.push(format!("Scale out compute capacity for {}", target));
    }
    if metric("memory_mean") >= 85.0 || metric("memory_trend") > 0.5 {
        actions.push("Investigate memory growth and recycle leaking workers".to_string());
    }
    if metric("latency_mean") >= 500.0 {
        actions.push("Check network paths and upstream dependencies".to_string());
    }
    if metric("error_rate_mean") >= 5.0 {
        actions.push("Review recent deployments and error logs".to_string());
    }
    if prediction_type == PredictionType::SystemFailure && forecast.probability >= 0.9 {
        actions.push("Prepare failover and notify on-call".to_string());
    }
    if actions.is_empty() {
        actions.push(format!("Increase monitoring frequency for {}", target));
    }
    actions
}
