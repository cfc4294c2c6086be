//! Prediction scheduling loop
//!
//! Periodically builds a live feature vector from the latest window, asks
//! every component predictor and the ensemble for a forecast, and replaces
//! the exposed prediction set with the ranked results.

use super::{FeatureExtractor, ModelRegistry};
use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::history::RollingHistory;
use crate::models::{FailurePrediction, FeatureVector};
use crate::observability::{EngineMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Default prediction interval
pub const DEFAULT_PREDICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on exposed predictions; anomaly predictions beyond it drop
/// off the tail
const MAX_EXPOSED_PREDICTIONS: usize = 256;

/// The externally visible prediction set
#[derive(Debug, Default)]
pub struct PredictionBoard {
    predictions: RwLock<Vec<FailurePrediction>>,
}

impl PredictionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<FailurePrediction> {
        self.predictions.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.predictions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.predictions.read().await.is_empty()
    }

    /// Replace the whole set, ranked by probability descending.
    /// Returns the number of exposed predictions.
    pub async fn replace(&self, mut predictions: Vec<FailurePrediction>) -> usize {
        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        predictions.truncate(MAX_EXPOSED_PREDICTIONS);
        let mut board = self.predictions.write().await;
        *board = predictions;
        board.len()
    }

    /// Put a prediction in front of the current set until the next replace
    pub async fn prepend(&self, prediction: FailurePrediction) -> usize {
        let mut board = self.predictions.write().await;
        board.insert(0, prediction);
        board.truncate(MAX_EXPOSED_PREDICTIONS);
        board.len()
    }
}

/// Runs prediction cycles against the shared history and registry
pub struct PredictionScheduler {
    history: Arc<RwLock<RollingHistory>>,
    registry: Arc<ModelRegistry>,
    board: Arc<PredictionBoard>,
    feature_extractor: FeatureExtractor,
    window_size: usize,
    interval: Duration,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl PredictionScheduler {
    pub fn new(
        history: Arc<RwLock<RollingHistory>>,
        registry: Arc<ModelRegistry>,
        board: Arc<PredictionBoard>,
        window_size: usize,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            history,
            registry,
            board,
            feature_extractor: FeatureExtractor::new(),
            window_size,
            interval: DEFAULT_PREDICTION_INTERVAL,
            metrics: EngineMetrics::new(),
            logger,
            health: HealthRegistry::new(),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Feature vector of the most recent full window
    pub async fn live_features(&self) -> Result<FeatureVector, EngineError> {
        let history = self.history.read().await;
        self.features_from(&history)
    }

    fn features_from(&self, history: &RollingHistory) -> Result<FeatureVector, EngineError> {
        let window = history.window(self.window_size);
        if window.len() < self.window_size {
            return Err(EngineError::InsufficientData {
                needed: self.window_size,
                have: window.len(),
            });
        }
        self.feature_extractor.extract(&window)
    }

    pub async fn predict_component(
        &self,
        component: &str,
    ) -> Result<Option<FailurePrediction>, EngineError> {
        let features = self.live_features().await?;
        self.registry.predict_component(component, &features)
    }

    pub async fn predict_ensemble(&self) -> Result<Option<FailurePrediction>, EngineError> {
        let features = self.live_features().await?;
        Ok(self.registry.predict_ensemble(&features))
    }

    /// One full cycle. Returns the number of exposed predictions, or
    /// `None` when there was not enough history to predict.
    pub async fn run_cycle(&self) -> Option<usize> {
        let start = Instant::now();

        // Held until the board is replaced, so an anomaly prepended for a
        // newer sample always lands after this cycle's results
        let history = self.history.read().await;
        let features = match self.features_from(&history) {
            Ok(f) => f,
            Err(e) => {
                drop(history);
                debug!(error = %e, "Skipping prediction cycle");
                self.health
                    .set_degraded(components::SCHEDULER, e.to_string())
                    .await;
                return None;
            }
        };

        let mut results = Vec::new();
        for component in self.registry.component_names() {
            match self.registry.predict_component(&component, &features) {
                Ok(Some(prediction)) => results.push(prediction),
                Ok(None) => {}
                Err(e) => warn!(component = %component, error = %e, "Component prediction failed"),
            }
        }
        if let Some(prediction) = self.registry.predict_ensemble(&features) {
            results.push(prediction);
        }

        for prediction in &results {
            self.logger.log_prediction(prediction);
        }

        let exposed = self.board.replace(results).await;
        drop(history);
        self.health.set_healthy(components::SCHEDULER).await;
        self.metrics.set_predictions_exposed(exposed);
        self.metrics
            .observe_prediction_cycle(start.elapsed().as_secs_f64());

        debug!(
            exposed = exposed,
            duration_us = start.elapsed().as_micros() as u64,
            "Prediction cycle completed"
        );
        Some(exposed)
    }

    /// Run the prediction loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting prediction scheduler"
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down prediction scheduler");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::models::{MetricsSample, PredictionSeverity, PredictionType};
    use std::collections::BTreeMap;

    fn sample(ts: i64, cpu: f64) -> MetricsSample {
        MetricsSample {
            timestamp: ts,
            cpu_usage: cpu,
            memory_usage: 50.0,
            network_latency: 20.0,
            active_connections: 10.0,
            error_rate: 0.1,
            response_time: 100.0,
            temperature: 40.0,
            disk_usage: 30.0,
        }
    }

    fn prediction(probability: f64) -> FailurePrediction {
        FailurePrediction {
            id: format!("p-{}", probability),
            timestamp: 1_700_000_000,
            prediction_type: PredictionType::ComponentFailure,
            probability,
            time_to_failure: 30.0,
            affected_components: vec!["system".to_string()],
            severity: PredictionSeverity::from_probability(probability),
            recommended_actions: vec![],
            confidence: 0.8,
            trigger_metrics: BTreeMap::new(),
        }
    }

    fn scheduler(threshold: f64, window: usize) -> (PredictionScheduler, Arc<RwLock<RollingHistory>>, Arc<PredictionBoard>) {
        let config = ModelConfig {
            confidence_threshold: threshold,
            window_size: window,
            ..Default::default()
        };
        let history = Arc::new(RwLock::new(RollingHistory::new()));
        let board = Arc::new(PredictionBoard::new());
        let scheduler = PredictionScheduler::new(
            history.clone(),
            Arc::new(ModelRegistry::from_config(&config)),
            board.clone(),
            window,
            StructuredLogger::new("test"),
        );
        (scheduler, history, board)
    }

    #[tokio::test]
    async fn test_board_ranks_on_replace() {
        let board = PredictionBoard::new();
        board
            .replace(vec![prediction(0.72), prediction(0.95), prediction(0.81)])
            .await;
        let ranked: Vec<f64> = board.snapshot().await.iter().map(|p| p.probability).collect();
        assert_eq!(ranked, vec![0.95, 0.81, 0.72]);
    }

    #[tokio::test]
    async fn test_prepend_survives_until_replace() {
        let board = PredictionBoard::new();
        board.replace(vec![prediction(0.9)]).await;
        board.prepend(prediction(0.8)).await;
        assert_eq!(board.snapshot().await[0].probability, 0.8);
        assert_eq!(board.len().await, 2);

        board.replace(vec![]).await;
        assert!(board.is_empty().await);
    }

    #[tokio::test]
    async fn test_cycle_without_history_is_noop() {
        let (scheduler, _history, board) = scheduler(0.7, 10);
        board.prepend(prediction(0.8)).await;
        assert_eq!(scheduler.run_cycle().await, None);
        // Existing set untouched by a skipped cycle
        assert_eq!(board.len().await, 1);
    }

    #[tokio::test]
    async fn test_short_history_is_insufficient() {
        let (scheduler, history, _board) = scheduler(0.7, 10);
        for i in 0..5 {
            history.write().await.append_metric(sample(1_700_000_000 + i * 60, 50.0));
        }
        let err = scheduler.live_features().await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { needed: 10, have: 5 }));
    }

    #[tokio::test]
    async fn test_cycle_replaces_anomaly_predictions() {
        let (scheduler, history, board) = scheduler(0.7, 10);
        for i in 0..20 {
            history.write().await.append_metric(sample(1_700_000_000 + i * 60, 45.0));
        }
        board.prepend(prediction(0.8)).await;

        // Calm history through untrained models stays below the threshold
        assert_eq!(scheduler.run_cycle().await, Some(0));
        assert!(board.is_empty().await);
    }

    #[tokio::test]
    async fn test_cycle_holds_history_until_board_replaced() {
        let (scheduler, history, board) = scheduler(0.7, 10);
        for i in 0..20 {
            history.write().await.append_metric(sample(1_700_000_000 + i * 60, 45.0));
        }
        let scheduler = Arc::new(scheduler);

        let board_guard = board.predictions.write().await;
        let cycle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_cycle().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A sample arriving mid-cycle waits for the replace
        let blocked = tokio::time::timeout(Duration::from_millis(20), history.write()).await;
        assert!(blocked.is_err());

        drop(board_guard);
        assert_eq!(cycle.await.unwrap(), Some(0));
        history.write().await.append_metric(sample(1_700_000_000 + 20 * 60, 45.0));
    }

    #[tokio::test]
    async fn test_zero_threshold_exposes_everything() {
        let (scheduler, history, board) = scheduler(0.0, 10);
        for i in 0..20 {
            history.write().await.append_metric(sample(1_700_000_000 + i * 60, 45.0));
        }
        // Five components plus the ensemble
        assert_eq!(scheduler.run_cycle().await, Some(6));
        let snapshot = board.snapshot().await;
        assert!(snapshot
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability));
        assert!(snapshot
            .iter()
            .any(|p| p.prediction_type == PredictionType::SystemFailure));
    }
}
