//! The gateway tier: serves the HTML form and proxies API calls to the
//! prediction service.
//!
//! Every `/predict` call checks field presence, probes the backend's
//! `/health` with a short timeout, then forwards the original body with a
//! longer one. Backend responses, errors included, are relayed verbatim;
//! only transport failures are translated (refused → 503, timeout → 504,
//! anything else → 500).

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use reqwest::Url;
use serde_json::{Map, Value};

use crate::{
    api_errors::AppError,
    config_loader::GatewayConfig,
    errors::{RiskError, RiskResult},
    prediction::{check_required_fields, parse_object},
    server,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Outcome of a liveness probe against the prediction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    /// `/health` answered 2xx.
    Online { model_loaded: bool },
    /// `/health` answered with a non-success status.
    Failing(StatusCode),
    /// No answer: refused, unreachable or timed out.
    Offline,
}

impl BackendStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, BackendStatus::Online { .. })
    }

    /// `(status, backend_status)` strings reported by the gateway's `/health`.
    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            BackendStatus::Online { model_loaded: true } => ("healthy", "online"),
            BackendStatus::Online { model_loaded: false } | BackendStatus::Failing(_) => {
                ("degraded", "online")
            }
            BackendStatus::Offline => ("unhealthy", "offline"),
        }
    }
}

/// A backend response relayed to the client unchanged.
#[derive(Debug)]
pub struct BackendReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl IntoResponse for BackendReply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }
}

/// HTTP client for the prediction service.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    health_timeout: Duration,
    predict_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &GatewayConfig) -> RiskResult<Self> {
        let mut base_url = Url::parse(&config.backend_url)
            .map_err(|e| RiskError::config(format!("invalid backend_url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RiskError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            health_timeout: config.health_timeout(),
            predict_timeout: config.predict_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> RiskResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RiskError::internal(format!("bad backend path {path}: {e}")))
    }

    /// `GET /health` with the short timeout. Never fails; unreachable is `Offline`.
    pub async fn probe(&self) -> BackendStatus {
        let url = match self.endpoint("health") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("{e}");
                return BackendStatus::Offline;
            }
        };

        let response = match self
            .http
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Backend health probe failed: {e}");
                return BackendStatus::Offline;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Backend health probe returned {status}");
            return BackendStatus::Failing(status);
        }

        // A body that is not the service's health object counts as no model.
        let model_loaded = match response.json::<Value>().await {
            Ok(body) => body
                .get("model_loaded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) if e.is_timeout() => {
                tracing::warn!("Backend health body timed out: {e}");
                return BackendStatus::Offline;
            }
            Err(e) => {
                tracing::warn!("Backend health body unreadable: {e}");
                false
            }
        };
        BackendStatus::Online { model_loaded }
    }

    /// Fail with `BackendUnavailable` unless the probe reports the backend live.
    pub async fn ensure_live(&self) -> RiskResult<()> {
        let status = self.probe().await;
        if status.is_live() {
            Ok(())
        } else {
            Err(RiskError::BackendUnavailable {
                operation: format!("health probe ({status:?})"),
                source: None,
            })
        }
    }

    pub async fn forward_predict(&self, payload: &Map<String, Value>) -> RiskResult<BackendReply> {
        let url = self.endpoint("predict")?;
        let request = self
            .http
            .post(url)
            .timeout(self.predict_timeout)
            .json(payload);
        self.relay(request, "forwarding prediction").await
    }

    pub async fn medications(&self) -> RiskResult<BackendReply> {
        let url = self.endpoint("medications")?;
        let request = self.http.get(url).timeout(self.predict_timeout);
        self.relay(request, "fetching medications").await
    }

    async fn relay(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> RiskResult<BackendReply> {
        let response = request
            .send()
            .await
            .map_err(|e| RiskError::from_transport(operation, e))?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .map_err(|e| RiskError::from_transport(operation, e))?;

        tracing::info!("Backend answered {status} while {operation}");
        Ok(BackendReply {
            status,
            content_type,
            body,
        })
    }
}

pub struct GatewayState {
    pub backend: BackendClient,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig) -> RiskResult<Self> {
        Ok(Self {
            backend: BackendClient::new(config)?,
        })
    }
}

/// Routes of the gateway, with the shared middleware stack.
pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/medications", get(medications))
        .with_state(state);

    server::with_common_layers(router)
}

pub async fn run(config: &GatewayConfig) -> RiskResult<()> {
    let state = Arc::new(GatewayState::new(config)?);
    tracing::info!("Gateway proxying to {}", state.backend.base_url());
    server::serve(
        build_gateway_router(state),
        &config.bind_address(),
        "Drug Risk Gateway",
    )
    .await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(st): State<Arc<GatewayState>>) -> (StatusCode, Json<Value>) {
    let backend = st.backend.probe().await;
    let (status, backend_status) = backend.labels();
    let code = if backend == BackendStatus::Offline {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        code,
        Json(serde_json::json!({
            "status": status,
            "backend_status": backend_status,
            "backend_url": st.backend.base_url().as_str(),
        })),
    )
}

async fn predict(
    State(st): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<BackendReply, AppError> {
    let payload = parse_object(&body)?;
    check_required_fields(&payload)?;

    st.backend.ensure_live().await?;
    Ok(st.backend.forward_predict(&payload).await?)
}

async fn medications(State(st): State<Arc<GatewayState>>) -> Result<BackendReply, AppError> {
    Ok(st.backend.medications().await?)
}
