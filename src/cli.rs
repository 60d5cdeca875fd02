use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::{
    app_state::AppState,
    config_loader::AppConfig,
    gateway,
    medication_encoder::MedicationEncoder,
    prediction::{parse_object, PredictionResponse, PredictionResult, ValidatedRequest},
    service,
};

/// Top-level CLI interface for the drug risk services
#[derive(Parser)]
#[command(
    name = "drug_risk",
    version,
    about = "Adverse drug reaction risk prediction service and gateway"
)]
pub struct Cli {
    /// Configuration file (defaults to drug_risk.toml or $DRUG_RISK_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the prediction API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Serve the gateway (HTML form + proxy to the prediction API)
    Gateway {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Base URL of the prediction API
        #[arg(long)]
        backend_url: Option<String>,
    },

    /// Run a single prediction locally from a JSON file ("-" for stdin)
    Predict {
        #[arg(short, long)]
        input: String,
    },

    /// List the medications the model knows, with their codes
    Medications,

    /// Print the effective configuration as TOML
    Config,
}

pub async fn dispatch(command: Commands, mut config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.service.host = host;
            }
            if let Some(port) = port {
                config.service.port = port;
            }
            service::run(&config.service).await?;
        }
        Commands::Gateway {
            host,
            port,
            backend_url,
        } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(url) = backend_url {
                config.gateway.backend_url = url;
            }
            config.validate().map_err(anyhow::Error::msg)?;
            gateway::run(&config.gateway).await?;
        }
        Commands::Predict { input } => {
            let raw = read_input(&input)?;
            let state = AppState::initialize(&config.service)?;

            let payload = parse_object(&raw)?;
            let request = ValidatedRequest::parse(&payload, &state.encoder)?;
            let classification = state.classify(request.features).await?;
            let result = PredictionResult::new(classification, &request.medication);
            let response = PredictionResponse::new(request, result);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Medications => {
            let encoder = MedicationEncoder::load_or_fallback(&config.service.encoder_path);
            let origin = if encoder.loaded_from_file() {
                config.service.encoder_path.display().to_string()
            } else {
                "built-in fallback table".to_string()
            };
            println!("{} medications ({origin}):", encoder.len());
            for name in encoder.names() {
                if let Some(code) = encoder.code(name) {
                    println!("  {code:>3}  {name}");
                }
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn read_input(input: &str) -> anyhow::Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading request from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(input).with_context(|| format!("reading request from {input}"))
    }
}
