mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use drug_risk::{
    config_loader::GatewayConfig,
    gateway::{build_gateway_router, GatewayState},
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

use common::{call, closed_port, fixed, service_app, spawn, valid_request};

fn gateway_for(addr: SocketAddr, health_timeout_ms: u64, predict_timeout_ms: u64) -> Router {
    let config = GatewayConfig {
        backend_url: format!("http://{addr}"),
        health_timeout_ms,
        predict_timeout_ms,
        ..GatewayConfig::default()
    };
    build_gateway_router(Arc::new(GatewayState::new(&config).unwrap()))
}

fn healthy_backend(predict_calls: Arc<AtomicUsize>, predict_delay: Duration) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({ "status": "API is running", "model_loaded": true })) }),
        )
        .route(
            "/predict",
            post(move || {
                let calls = predict_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(predict_delay).await;
                    Json(json!({ "prediction": { "risk_label": "LOW RISK" } }))
                }
            }),
        )
}

#[tokio::test]
async fn relays_real_service_prediction() {
    let backend = spawn(service_app(fixed(0.82, 1))).await;
    let gateway = gateway_for(backend, 2_000, 5_000);

    let (status, body) = call(&gateway, "POST", "/predict", Some(&valid_request())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"]["risk_label"], "HIGH RISK");
    assert_eq!(body["patient_info"]["medication"], "Metformin");
}

#[tokio::test]
async fn relays_backend_validation_errors_verbatim() {
    let backend = spawn(service_app(fixed(0.82, 1))).await;
    let gateway = gateway_for(backend, 2_000, 5_000);

    let mut payload = valid_request();
    payload["medication"] = json!("Unobtainium");
    let (status, body) = call(&gateway, "POST", "/predict", Some(&payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid medication: Unobtainium"));
    assert_eq!(body["available_medications"].as_array().unwrap().len(), 11);
}

/// Backend that announces a longer body than it sends, then hangs up.
async fn truncating_backend() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"medications\":",
                )
                .await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}

#[tokio::test]
async fn dropped_connection_is_a_gateway_error() {
    let gateway = gateway_for(truncating_backend().await, 2_000, 2_000);

    let (status, body) = call(&gateway, "GET", "/medications", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Gateway error: fetching medications failed");
}

#[tokio::test]
async fn missing_dose_is_rejected_at_the_gateway() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = spawn(healthy_backend(calls.clone(), Duration::ZERO)).await;
    let gateway = gateway_for(backend, 2_000, 5_000);

    let mut payload = valid_request();
    payload.as_object_mut().unwrap().remove("dose");
    let (status, body) = call(&gateway, "POST", "/predict", Some(&payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: dose");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_field_is_rejected_before_contacting_backend() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = spawn(healthy_backend(calls.clone(), Duration::ZERO)).await;
    let gateway = gateway_for(backend, 2_000, 5_000);

    let mut payload = valid_request();
    payload.as_object_mut().unwrap().remove("gender");
    let (status, body) = call(&gateway, "POST", "/predict", Some(&payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required field: gender");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_health_probe_blocks_forwarding() {
    let calls = Arc::new(AtomicUsize::new(0));
    let predict_calls = calls.clone();
    let backend = Router::new()
        .route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "model_loaded": true }))
            }),
        )
        .route(
            "/predict",
            post(move || {
                let calls = predict_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({}))
                }
            }),
        );
    let backend = spawn(backend).await;
    let gateway = gateway_for(backend, 200, 5_000);

    let (status, body) = call(&gateway, "POST", "/predict", Some(&valid_request())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"],
        "Prediction service is unavailable. Please try again later."
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_prediction_times_out() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = spawn(healthy_backend(calls.clone(), Duration::from_secs(3))).await;
    let gateway = gateway_for(backend, 2_000, 300);

    let (status, body) = call(&gateway, "POST", "/predict", Some(&valid_request())).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "Prediction service timed out");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn offline_backend_is_unavailable() {
    let gateway = gateway_for(closed_port().await, 500, 500);

    let (status, body) = call(&gateway, "POST", "/predict", Some(&valid_request())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (status, _) = call(&gateway, "GET", "/medications", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = call(&gateway, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["backend_status"], "offline");
}

#[tokio::test]
async fn health_reflects_backend_model_state() {
    let backend = spawn(service_app(fixed(0.5, 1))).await;
    let gateway = gateway_for(backend, 2_000, 5_000);
    let (status, body) = call(&gateway, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend_status"], "online");
    assert!(body["backend_url"]
        .as_str()
        .unwrap()
        .starts_with(&format!("http://{backend}")));

    let backend = spawn(service_app(None)).await;
    let gateway = gateway_for(backend, 2_000, 5_000);
    let (status, body) = call(&gateway, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backend_status"], "online");
}

#[tokio::test]
async fn health_body_that_is_not_json_is_degraded() {
    let backend = Router::new().route("/health", get(|| async { "not json" }));
    let gateway = gateway_for(spawn(backend).await, 2_000, 5_000);

    let (status, body) = call(&gateway, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backend_status"], "online");
}

#[tokio::test]
async fn medications_are_relayed() {
    let backend = spawn(service_app(None)).await;
    let gateway = gateway_for(backend, 2_000, 5_000);

    let (status, body) = call(&gateway, "GET", "/medications", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 11);
}

#[tokio::test]
async fn index_serves_the_form() {
    let gateway = gateway_for(closed_port().await, 500, 500);
    let response = gateway
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<form"));
}

#[tokio::test]
async fn gateway_rejects_non_object_bodies() {
    let gateway = gateway_for(closed_port().await, 500, 500);
    let payload: Value = json!([1, 2, 3]);
    let (status, body) = call(&gateway, "POST", "/predict", Some(&payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
