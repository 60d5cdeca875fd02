// drug_risk - main.rs
// Entry point for the prediction service, the gateway and the local tools.

use clap::Parser;

use drug_risk::cli::{dispatch, Cli};
use drug_risk::config_loader::load_config;
use drug_risk::log_sink::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging("info");
            tracing::error!("Failed to load config: {e}");
            return Err(e.into());
        }
    };
    init_logging(&config.log_level);

    dispatch(cli.command, config).await
}
