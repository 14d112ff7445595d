//! Auto-Detect Gateway Command Line Tool
//!
//! This binary is the command-line interface for the Auto-Detect Gateway.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use auto_detect_gateway::{Gateway, VERSION, APP_NAME};
use auto_detect_gateway::common::{init_logger, Result};
use auto_detect_gateway::config::{load_config, Overrides};

/// Auto-Detect Gateway: protocol detection in front of TCP services
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a file
    #[clap(short, long, env = "AUTO_DETECT_GATEWAY_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Listen address
    #[clap(short, long)]
    listen: Option<String>,

    /// Upstream server used by detectors that need server-side traffic
    #[clap(short, long)]
    upstream: Option<String>,

    /// Log level
    #[clap(long, env = "AUTO_DETECT_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[clap(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(args.log_level.as_deref().unwrap_or("info"));

    info!("Starting {} v{}", APP_NAME, VERSION);

    let overrides = Overrides {
        listen: args.listen.clone(),
        upstream: args.upstream.clone(),
        log_level: args.log_level.clone(),
    };

    let config = match load_config(args.config_file.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Configuration loaded successfully");

    if args.check {
        info!("Configuration check passed");
        return Ok(());
    }

    info!("Listen address: {}", config.listen);
    info!("Default service: {}", config.dispatch.default_service);
    for binding in &config.dispatch.detectors {
        info!("Detector binding: {} -> {}", binding.detector, binding.service);
    }

    let gateway = Gateway::from_config(&config);

    info!("Gateway ready, press Ctrl+C to stop");

    tokio::select! {
        result = gateway.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
