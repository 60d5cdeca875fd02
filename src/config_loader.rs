use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "drug_risk.toml";
pub const CONFIG_PATH_ENV: &str = "DRUG_RISK_CONFIG";
pub const ENV_PREFIX: &str = "DRUG_RISK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub fallback_model_path: PathBuf,
    pub encoder_path: PathBuf,
    /// Refuse to start when neither model file exists.
    pub require_model: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            model_path: PathBuf::from("model/risk_model.onnx"),
            fallback_model_path: PathBuf::from("model/risk_model.json"),
            encoder_path: PathBuf::from("data/medication_encoder.csv"),
            require_model: true,
        }
    }
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub backend_url: String,
    pub health_timeout_ms: u64,
    pub predict_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backend_url: "http://127.0.0.1:5001".to_string(),
            health_timeout_ms: 10_000,
            predict_timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.predict_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            service: ServiceConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.service.port == 0 {
            return Err("service.port must be non-zero".into());
        }
        if self.gateway.port == 0 {
            return Err("gateway.port must be non-zero".into());
        }
        if self.gateway.health_timeout_ms == 0 || self.gateway.predict_timeout_ms == 0 {
            return Err("gateway timeouts must be non-zero".into());
        }
        let url = reqwest::Url::parse(&self.gateway.backend_url)
            .map_err(|e| format!("gateway.backend_url is not a valid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err("gateway.backend_url must be an absolute http(s) URL".into());
        }
        Ok(())
    }
}

/// Layered configuration: defaults, TOML file, `DRUG_RISK_*` env, then `PORT`.
///
/// Nested keys use `__` in env names, e.g. `DRUG_RISK_GATEWAY__BACKEND_URL`.
pub fn figment(path: Option<&Path>) -> Figment {
    let file = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
        .merge(Env::raw().only(&["port"]).map(|_| "service.port".into()))
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, figment::Error> {
    let config: AppConfig = figment(path).extract()?;
    config.validate().map_err(figment::Error::from)?;
    Ok(config)
}
