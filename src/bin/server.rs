use log::{error, info, warn};
use std::sync::Arc;

use clicker_relay::config::ServerConfig;
use clicker_relay::core::filter::FilterChain;
use clicker_relay::core::server;
use clicker_relay::handlers::stdin;
use clicker_relay::hardware::NoBaseStation;

/// Usage: clicker_server [instructor-id [channel1 channel2 [port]]]
#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    }

    // Load config from the environment, then the command line
    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = config.apply_args(args.as_slice()) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("Starting Clicker Server...");
    info!("Instructor ID: {}", config.instructor_id);
    info!("Channel1: {}", config.channel1);
    info!("Channel2: {}", config.channel2);
    info!("Port: {}", config.port);

    let filters = match FilterChain::from_names(&config.filters, config.max_message_length) {
        Ok(filters) => filters,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // No driver is linked in; an embedding application supplies its own VoteSource
    let relay = match server::start(&config, Arc::new(NoBaseStation), filters).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let console = relay.queue.clone();
    tokio::spawn(async move {
        if let Err(e) = stdin::run(console).await {
            warn!("Console input failed: {}", e);
        }
    });

    tokio::select! {
        result = relay.wait() => {
            if let Err(e) = result {
                error!("{}", e);
            }
            std::process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }
}
