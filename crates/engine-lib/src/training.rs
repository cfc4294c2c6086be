//! Dataset preparation and the retraining loop
//!
//! A training pass slides the feature window across the whole metrics
//! history, labels each position by whether an error followed within the
//! prediction horizon, and trains every registered predictor on the result.
//! Only one pass runs at a time.

use crate::config::ModelConfig;
use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::history::RollingHistory;
use crate::models::{ErrorEvent, ExampleMetadata, FeatureVector, MetricsSample, TrainingExample};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::performance::{self, PerformanceTracker};
use crate::predictor::{FeatureExtractor, ModelRegistry, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info};

/// Fewest labelled windows a training pass will accept
pub const MIN_TRAINING_EXAMPLES: usize = 100;

/// How often the retrain loop checks whether training is due
pub const DEFAULT_RETRAIN_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Result of a `retrain` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingOutcome {
    /// Another pass was already in flight; nothing was done
    AlreadyRunning,
    /// Not enough labelled windows could be built
    InsufficientData { needed: usize, have: usize },
    /// The training task itself died before reporting
    Aborted { reason: String },
    Completed(TrainingReport),
}

impl TrainingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TrainingOutcome::Completed(report) if report.success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// True only when every predictor trained
    pub success: bool,
    pub results: Vec<TrainingResult>,
    pub examples: usize,
    pub positives: usize,
    pub duration_secs: f64,
    pub completed_at: i64,
}

/// Label for a window ending at `window_end`: 1 when any error falls in
/// `(window_end, window_end + horizon_secs]`. `error_times` must be sorted.
pub fn label_for_window(
    window_end: i64,
    horizon_secs: i64,
    error_times: &[(i64, &str)],
) -> (u8, ExampleMetadata) {
    let start = error_times.partition_point(|(ts, _)| *ts <= window_end);
    let end = error_times.partition_point(|(ts, _)| *ts <= window_end + horizon_secs);
    let upcoming = &error_times[start..end.max(start)];

    let kinds: BTreeSet<&str> = upcoming.iter().map(|(_, kind)| *kind).collect();
    let metadata = ExampleMetadata {
        future_error_count: upcoming.len(),
        future_error_kinds: kinds.into_iter().map(str::to_string).collect(),
    };
    (u8::from(!upcoming.is_empty()), metadata)
}

/// One labelled example per window position over the metrics history
pub fn prepare_dataset(
    metrics: &[MetricsSample],
    errors: &[ErrorEvent],
    window_size: usize,
    horizon_secs: i64,
) -> Result<Vec<TrainingExample>, EngineError> {
    if window_size == 0 || metrics.len() < window_size {
        return Ok(Vec::new());
    }

    let mut error_times: Vec<(i64, &str)> = errors
        .iter()
        .map(|e| (e.timestamp, e.kind.as_str()))
        .collect();
    error_times.sort_by_key(|(ts, _)| *ts);

    let extractor = FeatureExtractor::new();
    metrics
        .windows(window_size)
        .map(|window| {
            let features = extractor.extract(window)?;
            let (label, metadata) = label_for_window(features.window_end, horizon_secs, &error_times);
            Ok(TrainingExample {
                timestamp: features.window_end,
                features,
                label,
                metadata,
            })
        })
        .collect()
}

/// Clears the in-progress flag however the pass ends. Owned by the task
/// that runs the pass.
struct TrainingGuard {
    flag: Arc<AtomicBool>,
}

impl TrainingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What the blocking half of a pass hands back
enum PassResult {
    Insufficient(usize),
    Trained {
        results: Vec<TrainingResult>,
        examples: usize,
        positives: usize,
        counts: Option<performance::ConfusionCounts>,
    },
}

/// Shared state a training pass reads and updates
#[derive(Clone)]
struct PassContext {
    history: Arc<RwLock<RollingHistory>>,
    registry: Arc<ModelRegistry>,
    performance: Arc<PerformanceTracker>,
    config: Arc<ModelConfig>,
    last_training: Arc<RwLock<Option<i64>>>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl PassContext {
    /// Runs one pass to completion. The guard is held until the pass has
    /// published its results, whether or not anyone still awaits them.
    async fn execute(self, _guard: TrainingGuard) -> TrainingOutcome {
        let start = Instant::now();
        self.metrics.inc_training_runs();

        let (metrics, errors) = {
            let history = self.history.read().await;
            (history.metrics_snapshot(), history.errors_snapshot())
        };

        let registry = self.registry.clone();
        let config = self.config.clone();
        let joined = tokio::task::spawn_blocking(move || {
            run_training_pass(&registry, &config, &metrics, &errors)
        })
        .await;

        let pass = match joined {
            Ok(Ok(pass)) => pass,
            Ok(Err(e)) => return self.abort(e.to_string()).await,
            Err(e) => return self.abort(format!("training task failed: {}", e)).await,
        };

        match pass {
            PassResult::Insufficient(have) => {
                self.logger
                    .log_training_skipped(MIN_TRAINING_EXAMPLES, have);
                self.health
                    .set_degraded(
                        components::TRAINER,
                        format!(
                            "Insufficient data for training: {} examples, need {}",
                            have, MIN_TRAINING_EXAMPLES
                        ),
                    )
                    .await;
                TrainingOutcome::InsufficientData {
                    needed: MIN_TRAINING_EXAMPLES,
                    have,
                }
            }
            PassResult::Trained {
                results,
                examples,
                positives,
                counts,
            } => {
                let completed_at = chrono::Utc::now().timestamp();
                let duration_secs = start.elapsed().as_secs_f64();
                let failed: Vec<String> = results
                    .iter()
                    .filter(|r| !r.success)
                    .map(|r| r.component.clone())
                    .collect();
                let success = failed.is_empty();

                for result in self.registry.status() {
                    self.metrics.set_model_trained(
                        &result.component,
                        result.kind.as_str(),
                        result.trained,
                    );
                }
                self.metrics.observe_training_duration(duration_secs);
                self.logger
                    .log_training(success, examples, positives, &failed, duration_secs);

                if success {
                    *self.last_training.write().await = Some(completed_at);
                    if let Some(counts) = counts {
                        self.performance
                            .record(&counts, positives, completed_at)
                            .await;
                    }
                    self.health.set_healthy(components::TRAINER).await;
                    self.health.set_healthy(components::PREDICTOR).await;
                } else {
                    self.metrics.inc_training_failures();
                    self.health
                        .set_degraded(
                            components::TRAINER,
                            format!("Training failed for: {}", failed.join(", ")),
                        )
                        .await;
                }

                TrainingOutcome::Completed(TrainingReport {
                    success,
                    results,
                    examples,
                    positives,
                    duration_secs,
                    completed_at,
                })
            }
        }
    }

    async fn abort(&self, reason: String) -> TrainingOutcome {
        error!(error = %reason, "Training pass aborted");
        self.metrics.inc_training_failures();
        self.health
            .set_degraded(components::TRAINER, reason.clone())
            .await;
        TrainingOutcome::Aborted { reason }
    }
}

/// Single-flight trainer for the shared model registry
pub struct TrainingScheduler {
    pass: PassContext,
    in_progress: Arc<AtomicBool>,
    check_interval: Duration,
}

impl TrainingScheduler {
    pub fn new(
        history: Arc<RwLock<RollingHistory>>,
        registry: Arc<ModelRegistry>,
        performance: Arc<PerformanceTracker>,
        config: Arc<ModelConfig>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            pass: PassContext {
                history,
                registry,
                performance,
                config,
                last_training: Arc::new(RwLock::new(None)),
                metrics: EngineMetrics::new(),
                logger,
                health: HealthRegistry::new(),
            },
            in_progress: Arc::new(AtomicBool::new(false)),
            check_interval: DEFAULT_RETRAIN_CHECK_INTERVAL,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.pass.health = health;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn is_training(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Unix timestamp of the last fully successful pass
    pub async fn last_training(&self) -> Option<i64> {
        *self.pass.last_training.read().await
    }

    /// Whether the retrain interval has elapsed since the last success
    pub async fn is_due(&self, now: i64) -> bool {
        match self.last_training().await {
            None => true,
            Some(last) => now - last >= self.pass.config.retrain_interval().as_secs() as i64,
        }
    }

    /// Retrain only when due. `None` means nothing was attempted.
    pub async fn retrain_if_due(&self) -> Option<TrainingOutcome> {
        if !self.is_due(chrono::Utc::now().timestamp()).await {
            debug!("Retraining not due yet");
            return None;
        }
        Some(self.retrain().await)
    }

    /// Build the dataset and train every predictor.
    ///
    /// The pass runs on its own task. Dropping the returned future stops
    /// waiting for the outcome but not the pass, and the in-progress flag
    /// stays set until the pass finishes.
    pub async fn retrain(&self) -> TrainingOutcome {
        let guard = match TrainingGuard::acquire(&self.in_progress) {
            Some(guard) => guard,
            None => {
                debug!("Training already in progress");
                return TrainingOutcome::AlreadyRunning;
            }
        };

        let pass = self.pass.clone();
        match tokio::spawn(pass.execute(guard)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.pass
                    .abort(format!("training task failed: {}", e))
                    .await
            }
        }
    }

    /// Run the retrain loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            retrain_interval_secs = self.pass.config.retrain_interval().as_secs(),
            "Starting training scheduler"
        );

        let mut ticker = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(outcome) = self.retrain_if_due().await {
                        debug!(success = outcome.is_success(), "Scheduled retrain finished");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down training scheduler");
                    break;
                }
            }
        }
    }
}

/// Blocking half of a pass: dataset, training and in-sample evaluation
fn run_training_pass(
    registry: &ModelRegistry,
    config: &ModelConfig,
    metrics: &[MetricsSample],
    errors: &[ErrorEvent],
) -> Result<PassResult, EngineError> {
    let dataset = prepare_dataset(
        metrics,
        errors,
        config.window_size,
        config.prediction_horizon_secs(),
    )?;
    if dataset.len() < MIN_TRAINING_EXAMPLES {
        return Ok(PassResult::Insufficient(dataset.len()));
    }

    let (features, labels): (Vec<FeatureVector>, Vec<u8>) = dataset
        .into_iter()
        .map(|example| (example.features, example.label))
        .unzip();
    let positives = labels.iter().filter(|l| **l == 1).count();

    let results = registry.train_all(&features, &labels);
    let counts = results.iter().all(|r| r.success).then(|| {
        performance::evaluate(registry, &features, &labels, config.confidence_threshold)
    });

    Ok(PassResult::Trained {
        results,
        examples: features.len(),
        positives,
        counts,
    })
}
