//! Library root for the `drug_risk` crate
//! Prediction service and gateway for adverse drug reaction risk.

// Core error handling
pub mod api_errors;
pub mod errors;

// Configuration & CLI
pub mod cli;
pub mod config_loader;

// Model, encoding and request pipeline
pub mod classifier;
pub mod medication_encoder;
pub mod prediction;

// Web server interface
pub mod app_state;
pub mod gateway;
pub mod server;
pub mod service;

// Logging
pub mod log_sink;

pub use classifier::{Classification, Classifier};
pub use errors::{RiskError, RiskResult};
