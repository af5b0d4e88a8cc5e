//! `dd-scheduler` binary: parses config, starts the background reaper, and
//! blocks serving the scheduler RPC protocol (§6) until killed.

use clap::Parser;
use dd_scheduler::{run_reaper, Cli, SchedulerConfig, SchedulerState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Distinct exit codes reserved by §6: config/validation failures exit
/// non-zero, with a dedicated code for a bind failure so supervisors can
/// tell it apart from a plain config error.
const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_BIND_FAILURE: i32 = 3;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match SchedulerConfig::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            std::process::exit(EXIT_CONFIG_INVALID);
        }
    };

    log::info!(
        "starting dd-scheduler for partition {} with {} expected senders, bind={}",
        config.partition_id,
        config.sender_ids.len(),
        config.bind
    );

    let bind = config.bind.clone();
    let state = Arc::new(SchedulerState::new(config));
    let running = Arc::new(AtomicBool::new(true));

    let reaper_state = state.clone();
    let reaper_running = running.clone();
    let reaper = std::thread::spawn(move || run_reaper(reaper_state, reaper_running));

    let result = dd_transport::rpc_server::run_scheduler_server(state, bind);

    running.store(false, Ordering::Relaxed);
    let _ = reaper.join();

    if let Err(e) = result {
        log::error!("scheduler RPC server failed to bind/serve: {e}");
        std::process::exit(EXIT_BIND_FAILURE);
    }
}
