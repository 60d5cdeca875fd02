use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    classifier::{load_model, Classification, Classifier, LoadedModel, ModelSource},
    config_loader::ServiceConfig,
    errors::{RiskError, RiskResult},
    medication_encoder::MedicationEncoder,
    prediction::FeatureVector,
};

/// Process-wide state of the prediction service.
///
/// Built once before the listener binds and shared read-only with every
/// handler.
pub struct AppState {
    pub model: Option<Arc<dyn Classifier>>,
    pub model_source: Option<ModelSource>,
    pub encoder: MedicationEncoder,
    pub model_path: PathBuf,
    pub fallback_model_path: PathBuf,
    pub port: u16,
}

impl AppState {
    /// Assemble state from an already loaded model and encoder.
    ///
    /// Paths and port are taken from `config` so `/health` reports what the
    /// service was configured with.
    pub fn new(
        model: Option<LoadedModel>,
        encoder: MedicationEncoder,
        config: &ServiceConfig,
    ) -> Self {
        let (model, model_source) = match model {
            Some(m) => (Some(m.classifier), Some(m.source)),
            None => (None, None),
        };
        Self {
            model,
            model_source,
            encoder,
            model_path: config.model_path.clone(),
            fallback_model_path: config.fallback_model_path.clone(),
            port: config.port,
        }
    }

    /// Load the model and medication table named by `config`.
    ///
    /// A missing model is fatal unless `require_model` is off, in which case
    /// the service starts and `/predict` answers with an error.
    pub fn initialize(config: &ServiceConfig) -> RiskResult<Self> {
        let loaded = load_model(&config.model_path, &config.fallback_model_path)?;
        if loaded.is_none() {
            if config.require_model {
                return Err(RiskError::config(format!(
                    "no model found at {} or {}",
                    config.model_path.display(),
                    config.fallback_model_path.display()
                )));
            }
            tracing::warn!("Starting without a model; predictions will fail");
        }

        let encoder = MedicationEncoder::load_or_fallback(&config.encoder_path);
        tracing::info!("Available medications: {:?}", encoder.names());

        Ok(Self::new(loaded, encoder, config))
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Run the classifier on the blocking pool.
    pub async fn classify(&self, features: FeatureVector) -> RiskResult<Classification> {
        let model = self.model.clone().ok_or(RiskError::ModelUnavailable)?;
        tokio::task::spawn_blocking(move || model.classify(&features))
            .await
            .map_err(|e| RiskError::inference(format!("inference task failed: {e}")))?
    }
}
