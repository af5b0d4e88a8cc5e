//! `dd-builder` binary: parses config, resolves the downstream sender
//! endpoint if one is needed, and runs the input/sink/output threads until
//! the readout source closes.
//!
//! No concrete readout integration ships here (§1 out of scope): standalone
//! runs and demos feed fragments through the in-process
//! [`dd_builder::CrossbeamReadoutSource`]; a real deployment would plug in a
//! readout-specific `ReadoutInterface` instead of this binary's source.

use clap::Parser;
use dd_builder::{BuilderConfig, Cli, CrossbeamReadoutSource, OutputMode};
use dd_transport::FileRegistry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_RUN_FAILED: i32 = 3;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match BuilderConfig::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            std::process::exit(EXIT_CONFIG_INVALID);
        }
    };

    log::info!(
        "starting dd-builder: detector={} output_mode={:?} sink_enable={}",
        config.detector,
        config.output_mode(),
        config.sink_enable
    );

    let output_channel = match config.output_mode() {
        OutputMode::Standalone => None,
        OutputMode::Direct | OutputMode::Bridged => {
            let registry = match FileRegistry::open(&config.registry_path) {
                Ok(registry) => registry,
                Err(e) => {
                    log::error!("failed to open registry at {}: {e}", config.registry_path.display());
                    std::process::exit(EXIT_RUN_FAILED);
                }
            };
            let channel_name = if config.output_mode() == OutputMode::Bridged {
                &config.dpl_channel_name
            } else {
                &config.output_channel_name
            };
            match dd_builder::resolve_output_channel(&registry, channel_name) {
                Ok(channel) => Some(Box::new(channel) as Box<dyn dd_transport::Channel + Send>),
                Err(e) => {
                    log::error!("failed to resolve downstream sender: {e}");
                    std::process::exit(EXIT_RUN_FAILED);
                }
            }
        }
    };

    let (_tx, readout) = CrossbeamReadoutSource::channel();
    let stop = Arc::new(AtomicBool::new(false));

    if let Err(e) = dd_builder::run(readout, config, output_channel, stop) {
        log::error!("builder run failed: {e}");
        std::process::exit(EXIT_RUN_FAILED);
    }
}
