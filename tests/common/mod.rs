// Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use drug_risk::{
    app_state::AppState,
    classifier::{LoadedModel, ModelSource},
    config_loader::ServiceConfig,
    medication_encoder::MedicationEncoder,
    prediction::FeatureVector,
    service::build_service_router,
    Classifier, RiskError, RiskResult,
};
use serde_json::Value;
use tower::ServiceExt; // for .oneshot()

/// Classifier that answers the same thing for every input.
pub struct FixedClassifier {
    pub probability: f64,
    pub decision: u8,
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict_proba(&self, _features: &FeatureVector) -> RiskResult<f64> {
        Ok(self.probability)
    }

    fn predict(&self, _features: &FeatureVector) -> RiskResult<u8> {
        Ok(self.decision)
    }
}

/// Classifier whose every call fails with internal detail in the message.
pub struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict_proba(&self, _features: &FeatureVector) -> RiskResult<f64> {
        Err(RiskError::inference("secret tensor dump at /opt/models/x"))
    }

    fn predict(&self, _features: &FeatureVector) -> RiskResult<u8> {
        Err(RiskError::inference("secret tensor dump at /opt/models/x"))
    }
}

pub fn fixed(probability: f64, decision: u8) -> Option<Arc<dyn Classifier>> {
    Some(Arc::new(FixedClassifier {
        probability,
        decision,
    }))
}

pub fn service_app(model: Option<Arc<dyn Classifier>>) -> Router {
    let config = ServiceConfig::default();
    let loaded = model.map(|classifier| LoadedModel {
        classifier,
        source: ModelSource::Primary,
        path: config.model_path.clone(),
    });
    build_service_router(Arc::new(AppState::new(
        loaded,
        MedicationEncoder::fallback(),
        &config,
    )))
}

pub fn valid_request() -> Value {
    serde_json::json!({
        "gender": "Female",
        "age": 45,
        "medication": "Metformin",
        "dose": 500,
        "duration": 30
    })
}

pub async fn call(app: &Router, method: &str, uri: &str, body: Option<&Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub async fn call_raw(app: &Router, method: &str, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
