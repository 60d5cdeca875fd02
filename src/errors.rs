//! Error taxonomy for the prediction service and the gateway.
//!
//! Every failure a request can hit is one variant of [`RiskError`]. The
//! HTTP status and body each kind maps to are produced by
//! `api_errors::AppError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid input format: {field} {message}")]
    InvalidFormat { field: String, message: String },

    #[error("{message}")]
    OutOfRange { field: String, message: String },

    #[error("Invalid medication: {name}")]
    UnknownMedication {
        name: String,
        available: Vec<String>,
    },

    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("Model prediction failed: {message}")]
    ModelInference { message: String },

    #[error("Failed to load model from {path}: {message}")]
    ModelLoad { path: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Prediction service unavailable: {operation}")]
    BackendUnavailable {
        operation: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Prediction service timed out: {operation}")]
    BackendTimeout {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Gateway request failed: {operation}")]
    Gateway {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type RiskResult<T> = Result<T, RiskError>;

impl RiskError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_format(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn out_of_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_medication(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownMedication {
            name: name.into(),
            available,
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::ModelInference {
            message: message.into(),
        }
    }

    pub fn model_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a transport failure from the backend client.
    ///
    /// Timeouts become 504, refused or unreachable connections 503, and
    /// anything else a generic gateway failure.
    pub fn from_transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        let operation = operation.into();
        if source.is_timeout() {
            Self::BackendTimeout { operation, source }
        } else if source.is_connect() {
            Self::BackendUnavailable {
                operation,
                source: Some(source),
            }
        } else {
            Self::Gateway { operation, source }
        }
    }
}

impl From<std::io::Error> for RiskError {
    fn from(err: std::io::Error) -> Self {
        RiskError::io("io_operation", err)
    }
}

impl From<serde_json::Error> for RiskError {
    fn from(err: serde_json::Error) -> Self {
        RiskError::Serialization {
            context: "json_operation".to_string(),
            source: err,
        }
    }
}
