use std::sync::Arc;

use tracing::{error, info};

use workflow_metrics::config::{load_config, print_schema};
use workflow_metrics::metrics::Metrics;
use workflow_metrics::startup;
use workflow_metrics::utils::logger::init_logging;

const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

#[tokio::main]
async fn main() {
    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--schema") {
        if let Err(e) = print_schema() {
            eprintln!("Error printing schema: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let path = arg.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    let metrics = Metrics::new();
    if let Err(e) = init_logging(&config.logging, metrics.log_layer()) {
        eprintln!("Error initialising logging: {}", e);
        std::process::exit(1);
    }
    info!(config = %path, "Loaded configuration");

    if let Err(e) = startup::run(Arc::new(config), metrics).await {
        error!("Metrics server stopped: {}", e);
        std::process::exit(1);
    }
}
