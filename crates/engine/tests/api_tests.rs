//! Integration tests for the engine API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use engine_lib::health::components;
use engine_lib::{FailureEngine, ModelConfig};
use failure_engine::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const T0: i64 = 1_700_000_000;

fn setup_test_app() -> (Router, Arc<FailureEngine>) {
    let config = ModelConfig {
        window_size: 10,
        ..Default::default()
    };
    let engine = Arc::new(FailureEngine::new(config).unwrap());
    let state = Arc::new(AppState::new(engine.clone()));
    (create_router(state), engine)
}

fn sample_json(ts: i64, cpu: f64) -> Value {
    json!({
        "timestamp": ts,
        "cpu_usage": cpu,
        "memory_usage": 50.0,
        "network_latency": 30.0,
        "active_connections": 20.0,
        "error_rate": 0.4,
        "response_time": 210.0,
        "temperature": 44.0,
        "disk_usage": 38.0
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, engine) = setup_test_app();
    engine.health().register(components::HISTORY).await;
    engine
        .health()
        .set_degraded(components::PREDICTOR, "Models not trained yet")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert!(health["components"]["history"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, engine) = setup_test_app();
    engine
        .health()
        .set_unhealthy(components::TRAINER, "Training task panicked")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_readiness_flag() {
    let (app, engine) = setup_test_app();

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    engine.health().set_ready(true).await;
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_ingest_metric_accepts_calm_sample() {
    let (app, engine) = setup_test_app();

    let response = app
        .oneshot(post_json("/api/v1/metrics", &sample_json(T0, 42.0)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], true);
    assert!(body.get("anomaly").is_none());
    assert_eq!(engine.status().await.metric_samples, 1);
}

#[tokio::test]
async fn test_ingest_metric_returns_anomaly() {
    let (app, _engine) = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/metrics", &sample_json(T0, 97.0)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(
        body["anomaly"]["prediction_type"],
        "PERFORMANCE_DEGRADATION"
    );

    let response = app.oneshot(get("/api/v1/predictions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let predictions = body_json(response).await;
    assert_eq!(predictions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ingest_metric_rejects_malformed_body() {
    let (app, engine) = setup_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/metrics")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"timestamp": "yesterday"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "malformed_body");
    assert!(body["error"].is_string());
    assert_eq!(engine.status().await.metric_samples, 0);
}

#[tokio::test]
async fn test_ingest_metric_rejects_invalid_timestamp() {
    let (app, _engine) = setup_test_app();

    let response = app
        .oneshot(post_json("/api/v1/metrics", &sample_json(0, 40.0)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_sample");
}

#[tokio::test]
async fn test_ingest_error_event() {
    let (app, engine) = setup_test_app();

    let event = json!({
        "id": "evt-1",
        "kind": "network_timeout",
        "severity": "high",
        "message": "upstream did not answer",
        "timestamp": T0,
        "component": "network"
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/errors", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(engine.status().await.error_events, 1);

    let empty_id = json!({
        "id": " ",
        "kind": "network_timeout",
        "severity": "high",
        "message": "upstream did not answer",
        "timestamp": T0,
        "component": "network"
    });
    let response = app
        .oneshot(post_json("/api/v1/errors", &empty_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_event");
}

#[tokio::test]
async fn test_retrain_with_little_history_reports_insufficient_data() {
    let (app, _engine) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/retrain")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "insufficient_data");
    assert_eq!(body["have"], 0);
}

#[tokio::test]
async fn test_status_and_performance() {
    let (app, _engine) = setup_test_app();

    let response = app.clone().oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["window_size"], 10);
    assert_eq!(status["training_in_progress"], false);
    assert_eq!(status["models"].as_array().unwrap().len(), 5);

    let response = app.oneshot(get("/api/v1/performance")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data_points"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _engine) = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/metrics", &sample_json(T0, 40.0)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("fpe_ingest_latency_seconds_bucket"));
    assert!(metrics_text.contains("fpe_history_metric_samples"));
}
