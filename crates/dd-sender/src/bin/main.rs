//! `dd-sender` binary: parses config, opens the shared endpoint registry,
//! and runs the sender to completion.

use clap::Parser;
use dd_sender::{Cli, SenderConfig};
use dd_transport::FileRegistry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_REGISTRY_FAILED: i32 = 3;
const EXIT_RUN_FAILED: i32 = 4;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match SenderConfig::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            std::process::exit(EXIT_CONFIG_INVALID);
        }
    };

    log::info!(
        "starting dd-sender {} for partition {} (scheduler={})",
        config.sender_id,
        config.partition_id,
        config.scheduler_url
    );

    let registry = match FileRegistry::open(&config.registry_path) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("failed to open registry at {}: {e}", config.registry_path.display());
            std::process::exit(EXIT_REGISTRY_FAILED);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = dd_sender::run(config, &registry, stop) {
        log::error!("sender run failed: {e}");
        std::process::exit(EXIT_RUN_FAILED);
    }
}
