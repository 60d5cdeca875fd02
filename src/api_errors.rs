use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::RiskError;

pub const NOT_FOUND_MESSAGE: &str = "Endpoint not found";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    UnknownMedication {
        message: String,
        available_medications: Vec<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    GatewayTimeout(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::UnknownMedication { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_medications: Option<Vec<String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::UnknownMedication {
                message,
                available_medications,
            } => ErrBody {
                error: message,
                available_medications: Some(available_medications),
            },
            other => ErrBody {
                error: other.to_string(),
                available_medications: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

// Caller-facing text for each kind; internal detail only reaches the log.
impl From<RiskError> for AppError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::MissingField { .. }
            | RiskError::InvalidFormat { .. }
            | RiskError::OutOfRange { .. } => {
                tracing::warn!("Rejected request: {err}");
                AppError::BadRequest(err.to_string())
            }
            RiskError::UnknownMedication { name, available } => {
                tracing::warn!("Invalid medication requested: {name}");
                AppError::UnknownMedication {
                    message: format!(
                        "Invalid medication: {name}. Available medications: {}",
                        available.join(", ")
                    ),
                    available_medications: available,
                }
            }
            RiskError::ModelUnavailable => {
                tracing::error!("Model not loaded for prediction request");
                AppError::Internal("Model not loaded".to_string())
            }
            RiskError::ModelInference { message } => {
                tracing::error!("Model prediction failed: {message}");
                AppError::Internal("Model prediction failed".to_string())
            }
            RiskError::BackendUnavailable { ref operation, .. } => {
                tracing::error!("Backend unavailable during {operation}: {err:?}");
                AppError::ServiceUnavailable(
                    "Prediction service is unavailable. Please try again later.".to_string(),
                )
            }
            RiskError::BackendTimeout { ref operation, .. } => {
                tracing::error!("Backend timed out during {operation}");
                AppError::GatewayTimeout("Prediction service timed out".to_string())
            }
            RiskError::Gateway {
                ref operation,
                ref source,
            } => {
                tracing::error!("Gateway {operation} failed: {source}");
                AppError::Internal(format!("Gateway error: {operation} failed"))
            }
            other => {
                tracing::error!("Unexpected error: {other:?}");
                AppError::Internal(INTERNAL_MESSAGE.to_string())
            }
        }
    }
}
