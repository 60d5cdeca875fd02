//! HTTP surface of the prediction service.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::{
    api_errors::AppError,
    app_state::AppState,
    config_loader::ServiceConfig,
    errors::RiskResult,
    prediction::{parse_object, PredictionResponse, PredictionResult, ValidatedRequest},
    server,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub encoder_loaded: bool,
    pub model_path_exists: bool,
    pub fallback_path_exists: bool,
    pub available_medications: Vec<String>,
    pub medication_count: usize,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct MedicationsResponse {
    pub medications: Vec<String>,
    pub count: usize,
}

/// Routes of the prediction service, with the shared middleware stack.
pub fn build_service_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/medications", get(medications))
        .with_state(state);

    server::with_common_layers(router)
}

/// Initialize state from `config` and serve until shutdown.
pub async fn run(config: &ServiceConfig) -> RiskResult<()> {
    let state = Arc::new(AppState::initialize(config)?);
    tracing::info!(
        "Model loaded: {} ({:?}), encoder from file: {}",
        state.model_loaded(),
        state.model_source,
        state.encoder.loaded_from_file()
    );
    server::serve(
        build_service_router(state),
        &config.bind_address(),
        "Drug Risk Prediction API",
    )
    .await
}

async fn home(State(st): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Drug Risk Prediction API",
        "status": "running",
        "port": st.port,
    }))
}

async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "API is running",
        model_loaded: st.model_loaded(),
        encoder_loaded: st.encoder.loaded_from_file(),
        model_path_exists: st.model_path.exists(),
        fallback_path_exists: st.fallback_model_path.exists(),
        available_medications: st.encoder.names().to_vec(),
        medication_count: st.encoder.len(),
        port: st.port,
    })
}

async fn medications(State(st): State<Arc<AppState>>) -> Json<MedicationsResponse> {
    Json(MedicationsResponse {
        medications: st.encoder.names().to_vec(),
        count: st.encoder.len(),
    })
}

async fn predict(
    State(st): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictionResponse>, AppError> {
    if !st.model_loaded() {
        return Err(crate::errors::RiskError::ModelUnavailable.into());
    }

    let payload = parse_object(&body)?;
    let request = ValidatedRequest::parse(&payload, &st.encoder)?;
    let classification = st.classify(request.features).await?;
    let result = PredictionResult::new(classification, &request.medication);

    tracing::info!(
        "Prediction successful: {} (prob: {:.4})",
        result.risk_label.as_str(),
        result.risk_probability
    );
    Ok(Json(PredictionResponse::new(request, result)))
}
