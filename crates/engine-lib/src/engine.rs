//! The failure prediction engine
//!
//! `FailureEngine` wires the rolling history, anomaly detector, model
//! registry and both schedulers together. It is built once and shared by
//! `Arc`; every operation takes `&self`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::anomaly::{Alert, Alerter, RealTimeAnomalyDetector, DEFAULT_DEDUP_WINDOW};
use crate::config::ModelConfig;
use crate::correlation;
use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::history::{HistoryConfig, RollingHistory};
use crate::models::{ErrorEvent, FailurePrediction, MetricsSample, ModelPerformance};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::performance::PerformanceTracker;
use crate::predictor::{
    ModelRegistry, ModelStatus, PredictionBoard, PredictionScheduler, DEFAULT_PREDICTION_INTERVAL,
};
use crate::training::{TrainingOutcome, TrainingScheduler, DEFAULT_RETRAIN_CHECK_INTERVAL};

/// Runtime knobs that are not part of the model configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name attached to structured log events
    pub instance: String,
    pub prediction_interval: Duration,
    pub retrain_check_interval: Duration,
    pub alert_dedup_window: Duration,
    pub history: HistoryConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            instance: "failure-engine".to_string(),
            prediction_interval: DEFAULT_PREDICTION_INTERVAL,
            retrain_check_interval: DEFAULT_RETRAIN_CHECK_INTERVAL,
            alert_dedup_window: DEFAULT_DEDUP_WINDOW,
            history: HistoryConfig::default(),
        }
    }
}

/// Point-in-time view of the engine's internal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub metric_samples: usize,
    pub error_events: usize,
    pub exposed_predictions: usize,
    pub training_in_progress: bool,
    pub last_training: Option<i64>,
    pub window_size: usize,
    pub confidence_threshold: f64,
    pub models: Vec<ModelStatus>,
}

pub struct FailureEngine {
    config: Arc<ModelConfig>,
    history: Arc<RwLock<RollingHistory>>,
    registry: Arc<ModelRegistry>,
    board: Arc<PredictionBoard>,
    performance: Arc<PerformanceTracker>,
    detector: RealTimeAnomalyDetector,
    alerter: Alerter,
    scheduler: Arc<PredictionScheduler>,
    trainer: Arc<TrainingScheduler>,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl FailureEngine {
    /// Engine with one untrained predictor per configured component
    pub fn new(config: ModelConfig) -> Result<Self, EngineError> {
        Self::with_options(config, EngineOptions::default())
    }

    pub fn with_options(config: ModelConfig, options: EngineOptions) -> Result<Self, EngineError> {
        config.validate()?;
        let registry = ModelRegistry::from_config(&config);
        Self::with_registry(config, options, registry)
    }

    /// Engine around a caller-built registry
    pub fn with_registry(
        config: ModelConfig,
        options: EngineOptions,
        registry: ModelRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        options.history.validate_for_window(config.window_size)?;
        if registry.is_empty() {
            return Err(EngineError::InvalidConfig(
                "model registry has no components".to_string(),
            ));
        }

        let config = Arc::new(config);
        let history = Arc::new(RwLock::new(RollingHistory::with_config(options.history)));
        let registry = Arc::new(registry);
        let board = Arc::new(PredictionBoard::new());
        let performance = Arc::new(PerformanceTracker::new());
        let health = HealthRegistry::new();
        let logger = StructuredLogger::new(options.instance);

        let scheduler = PredictionScheduler::new(
            history.clone(),
            registry.clone(),
            board.clone(),
            config.window_size,
            logger.clone(),
        )
        .with_interval(options.prediction_interval)
        .with_health(health.clone());

        let trainer = TrainingScheduler::new(
            history.clone(),
            registry.clone(),
            performance.clone(),
            config.clone(),
            logger.clone(),
        )
        .with_check_interval(options.retrain_check_interval)
        .with_health(health.clone());

        Ok(Self {
            detector: RealTimeAnomalyDetector::new(config.anomaly_thresholds.clone()),
            alerter: Alerter::new().with_dedup_window(options.alert_dedup_window),
            config,
            history,
            registry,
            board,
            performance,
            scheduler: Arc::new(scheduler),
            trainer: Arc::new(trainer),
            health,
            metrics: EngineMetrics::new(),
            logger,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerter.subscribe()
    }

    /// Validate and store a sample, then run the threshold check. A breach
    /// is exposed immediately and returned.
    pub async fn ingest_metric(
        &self,
        sample: MetricsSample,
    ) -> Result<Option<FailurePrediction>, EngineError> {
        let start = Instant::now();

        if let Err(e) = sample.validate() {
            warn!(error = %e, "Rejected metrics sample");
            self.metrics.inc_rejected_input("metric");
            return Err(e);
        }

        let mut history = self.history.write().await;
        history.append_metric(sample.clone());
        self.metrics
            .set_history_size(history.metrics_len(), history.errors_len());

        // Prepended under the history lock so a prediction cycle that has
        // not seen this sample cannot overwrite it
        let anomaly = match self.detector.detect(&sample) {
            Some((prediction, breaches)) => {
                let exposed = self.board.prepend(prediction.clone()).await;
                drop(history);
                self.metrics.inc_anomalies_detected();
                self.metrics.set_predictions_exposed(exposed);
                self.logger.log_anomaly(&prediction);
                self.alerter.publish(&prediction, &breaches);
                Some(prediction)
            }
            None => None,
        };

        self.metrics
            .observe_ingest_latency(start.elapsed().as_secs_f64());
        Ok(anomaly)
    }

    /// Validate and store an error event and log how it lines up with the
    /// metrics around it
    pub async fn ingest_error(&self, event: ErrorEvent) -> Result<(), EngineError> {
        if let Err(e) = event.validate() {
            warn!(error = %e, "Rejected error event");
            self.metrics.inc_rejected_input("error");
            return Err(e);
        }

        let elevated = {
            let history = self.history.read().await;
            correlation::elevated_metrics(
                &history.metrics_up_to(event.timestamp, self.config.window_size),
                event.timestamp,
                self.config.window_size,
            )
        };
        let (metric_samples, error_events) = {
            let mut history = self.history.write().await;
            history.append_error(event.clone());
            (history.metrics_len(), history.errors_len())
        };
        self.metrics.set_history_size(metric_samples, error_events);
        self.logger
            .log_error_correlation(&event.id, &event.component, &elevated);
        Ok(())
    }

    pub async fn current_predictions(&self) -> Vec<FailurePrediction> {
        self.board.snapshot().await
    }

    pub async fn model_performance(&self) -> ModelPerformance {
        self.performance.snapshot().await
    }

    /// Forecast for one component from the latest window. Not enough
    /// history yields `Ok(None)`.
    pub async fn predict_component(
        &self,
        component: &str,
    ) -> Result<Option<FailurePrediction>, EngineError> {
        if !self.registry.component_names().iter().any(|c| c == component) {
            return Err(EngineError::UnknownComponent(component.to_string()));
        }
        match self.scheduler.predict_component(component).await {
            Err(e @ EngineError::InsufficientData { .. }) | Err(e @ EngineError::EmptyWindow) => {
                debug!(component = %component, error = %e, "No component forecast");
                Ok(None)
            }
            other => other,
        }
    }

    /// Ensemble forecast from the latest window
    pub async fn predict_ensemble(&self) -> Option<FailurePrediction> {
        match self.scheduler.predict_ensemble().await {
            Ok(prediction) => prediction,
            Err(e) => {
                debug!(error = %e, "No ensemble forecast");
                None
            }
        }
    }

    /// Run one prediction cycle now. `None` when history is too short.
    pub async fn run_prediction_cycle(&self) -> Option<usize> {
        self.scheduler.run_cycle().await
    }

    pub async fn retrain(&self) -> TrainingOutcome {
        self.trainer.retrain().await
    }

    pub async fn retrain_if_due(&self) -> Option<TrainingOutcome> {
        self.trainer.retrain_if_due().await
    }

    pub async fn status(&self) -> EngineStatus {
        let (metric_samples, error_events) = {
            let history = self.history.read().await;
            (history.metrics_len(), history.errors_len())
        };
        EngineStatus {
            metric_samples,
            error_events,
            exposed_predictions: self.board.len().await,
            training_in_progress: self.trainer.is_training(),
            last_training: self.trainer.last_training().await,
            window_size: self.config.window_size,
            confidence_threshold: self.config.confidence_threshold,
            models: self.registry.status(),
        }
    }

    /// Mark components healthy, flag readiness and start the prediction
    /// and retrain loops. Both loops stop on the shutdown signal.
    pub async fn spawn_loops(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.health.register(components::HISTORY).await;
        self.health.register(components::SCHEDULER).await;
        self.health.register(components::TRAINER).await;
        if self.registry.status().iter().all(|m| m.trained) {
            self.health.set_healthy(components::PREDICTOR).await;
        } else {
            self.health
                .set_degraded(
                    components::PREDICTOR,
                    "Models not trained yet, using heuristic fallback",
                )
                .await;
        }
        self.health.set_ready(true).await;

        vec![
            tokio::spawn(self.scheduler.clone().run(shutdown.subscribe())),
            tokio::spawn(self.trainer.clone().run(shutdown.subscribe())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::models::{ErrorSeverity, PredictionType};

    const T0: i64 = 1_700_000_000;

    fn sample(ts: i64, cpu: f64) -> MetricsSample {
        MetricsSample {
            timestamp: ts,
            cpu_usage: cpu,
            memory_usage: 50.0,
            network_latency: 25.0,
            active_connections: 15.0,
            error_rate: 0.2,
            response_time: 180.0,
            temperature: 42.0,
            disk_usage: 35.0,
        }
    }

    fn engine(window: usize) -> FailureEngine {
        FailureEngine::new(ModelConfig {
            window_size: window,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ModelConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            FailureEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_window_larger_than_history_rejected() {
        let config = ModelConfig {
            window_size: 2000,
            ..Default::default()
        };
        assert!(matches!(
            FailureEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_sample_rejected_and_not_stored() {
        let engine = engine(10);
        let err = engine
            .ingest_metric(sample(T0, f64::NAN))
            .await
            .unwrap_err();
        assert!(err.is_rejected_input());
        assert_eq!(engine.status().await.metric_samples, 0);
    }

    #[tokio::test]
    async fn test_breach_is_exposed_immediately() {
        let engine = engine(10);
        let mut alerts = engine.subscribe_alerts();

        let anomaly = engine.ingest_metric(sample(T0, 99.0)).await.unwrap().unwrap();
        assert_eq!(anomaly.prediction_type, PredictionType::PerformanceDegradation);

        let current = engine.current_predictions().await;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, anomaly.id);
        assert_eq!(alerts.recv().await.unwrap().prediction_id, anomaly.id);
    }

    #[tokio::test]
    async fn test_repeated_breach_still_exposed_when_alert_deduplicated() {
        let engine = engine(10);
        engine.ingest_metric(sample(T0, 99.0)).await.unwrap();
        engine.ingest_metric(sample(T0 + 60, 99.0)).await.unwrap();
        assert_eq!(engine.current_predictions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_error_event_does_not_create_prediction() {
        let engine = engine(10);
        for i in 0..20 {
            engine.ingest_metric(sample(T0 + i * 60, 45.0)).await.unwrap();
        }
        engine
            .ingest_error(ErrorEvent {
                id: "e-1".to_string(),
                kind: "timeout".to_string(),
                severity: ErrorSeverity::Medium,
                message: "upstream timed out".to_string(),
                timestamp: T0 + 19 * 60,
                component: "network".to_string(),
                context: None,
            })
            .await
            .unwrap();

        let status = engine.status().await;
        assert_eq!(status.error_events, 1);
        assert!(engine.current_predictions().await.is_empty());
    }

    async fn ingest_oscillating(engine: &FailureEngine, from: i64, count: i64, low: f64, high: f64) {
        for i in from..from + count {
            let cpu = if i % 2 == 0 { low } else { high };
            engine.ingest_metric(sample(T0 + i * 60, cpu)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_error_free_day_trains_and_stays_quiet() {
        let engine = FailureEngine::new(ModelConfig::default()).unwrap();
        ingest_oscillating(&engine, 0, 1440, 40.0, 60.0).await;

        let outcome = engine.retrain().await;
        assert!(outcome.is_success(), "unexpected outcome {:?}", outcome);
        let status = engine.status().await;
        assert!(status.last_training.is_some());
        assert!(status.models.iter().all(|m| m.trained));
        assert_eq!(engine.predict_ensemble().await, None);
        assert_eq!(engine.run_prediction_cycle().await, Some(0));
    }

    #[tokio::test]
    async fn test_anomaly_score_ignores_calmer_load() {
        let engine = FailureEngine::new(ModelConfig {
            model_type: ModelKind::AnomalyScore,
            ..Default::default()
        })
        .unwrap();
        ingest_oscillating(&engine, 0, 1440, 40.0, 60.0).await;
        assert!(engine.retrain().await.is_success());

        ingest_oscillating(&engine, 1440, 60, 45.0, 55.0).await;
        assert_eq!(engine.predict_ensemble().await, None);
    }

    #[tokio::test]
    async fn test_unknown_component() {
        let engine = engine(10);
        assert!(matches!(
            engine.predict_component("billing").await,
            Err(EngineError::UnknownComponent(_))
        ));
    }

    #[tokio::test]
    async fn test_short_history_predicts_nothing() {
        let engine = engine(10);
        engine.ingest_metric(sample(T0, 45.0)).await.unwrap();
        assert_eq!(engine.predict_component("system").await.unwrap(), None);
        assert_eq!(engine.predict_ensemble().await, None);
        assert_eq!(engine.run_prediction_cycle().await, None);
    }

    #[tokio::test]
    async fn test_spawned_loops_stop_on_shutdown() {
        let engine = Arc::new(
            FailureEngine::with_options(
                ModelConfig::default(),
                EngineOptions {
                    prediction_interval: Duration::from_millis(10),
                    retrain_check_interval: Duration::from_millis(10),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let (shutdown, _) = broadcast::channel(1);
        let handles = engine.spawn_loops(&shutdown).await;
        assert!(engine.health().readiness().await.ready);

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.send(()).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
