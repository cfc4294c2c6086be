//! HTTP API for ingestion, prediction queries, health checks and metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use engine_lib::{
    ComponentStatus, EngineError, EngineMetrics, ErrorEvent, FailureEngine, FailurePrediction,
    MetricsSample, TrainingOutcome,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FailureEngine>,
    pub metrics: EngineMetrics,
}

impl AppState {
    pub fn new(engine: Arc<FailureEngine>) -> Self {
        Self {
            engine,
            metrics: EngineMetrics::new(),
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Failure response carrying an HTTP status and a JSON error body
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                code: code.to_string(),
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            e if e.is_rejected_input() => StatusCode::BAD_REQUEST,
            EngineError::UnknownComponent(_) => StatusCode::NOT_FOUND,
            EngineError::TrainingInProgress => StatusCode::CONFLICT,
            EngineError::InsufficientData { .. } | EngineError::EmptyWindow => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "malformed_body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Response to an accepted metrics sample
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<FailurePrediction>,
}

/// Health check response - 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.engine.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.engine.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_encoding",
            e.to_string(),
        )
        .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn predictions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.current_predictions().await)
}

async fn performance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.model_performance().await)
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

async fn ingest_metric(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MetricsSample>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(sample) = payload.map_err(|rejection| {
        state.metrics.inc_rejected_input("metric");
        ApiError::from(rejection)
    })?;
    let anomaly = state.engine.ingest_metric(sample).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted: true,
            anomaly,
        }),
    ))
}

async fn ingest_error(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ErrorEvent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(event) = payload.map_err(|rejection| {
        state.metrics.inc_rejected_input("error");
        ApiError::from(rejection)
    })?;
    state.engine.ingest_error(event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted: true,
            anomaly: None,
        }),
    ))
}

async fn retrain(State(state): State<Arc<AppState>>) -> Result<Json<TrainingOutcome>, ApiError> {
    match state.engine.retrain().await {
        TrainingOutcome::AlreadyRunning => Err(EngineError::TrainingInProgress.into()),
        outcome => Ok(Json(outcome)),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/predictions", get(predictions))
        .route("/api/v1/performance", get(performance))
        .route("/api/v1/status", get(status))
        .route("/api/v1/metrics", post(ingest_metric))
        .route("/api/v1/errors", post(ingest_error))
        .route("/api/v1/retrain", post(retrain))
        .with_state(state)
}

/// Start the API server, stopping when the shutdown future completes
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
