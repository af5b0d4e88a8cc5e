//! TF Scheduler role (§4.6): builder membership/health registry, the
//! per-TFID assignment state machine, and the RPC surface that ties them
//! together.
//!
//! The binary in `src/bin/main.rs` is a thin wrapper: parse config, build a
//! [`handlers::SchedulerState`], spawn the stale-builder reaper and the
//! terminal-record garbage collector, then block serving RPCs until the
//! process is killed.

pub mod config;
pub mod handlers;
pub mod membership;
pub mod tf_state;

pub use config::{Cli, ConfigError, SchedulerConfig};
pub use handlers::SchedulerState;
pub use membership::BuilderRegistry;
pub use tf_state::{TfState, TfTable};

use std::sync::Arc;
use std::time::Duration;

/// How often the background reaper checks for stale builders and GCs
/// terminal TFID records. Independent of `builder_timeout`/`tf_grace_period`
/// themselves, which control what counts as stale/expired.
const REAPER_INTERVAL: Duration = Duration::from_millis(500);

/// Evicts builders whose heartbeat has lapsed past `builder_timeout` and
/// fails any TFID dispatched to them (§4.6 Builder timeout), then
/// garbage-collects terminal records older than `tf_grace_period`. Runs
/// until `running` is cleared; intended to be spawned on its own thread
/// alongside the RPC server.
pub fn run_reaper(state: Arc<SchedulerState>, running: Arc<std::sync::atomic::AtomicBool>) {
    use std::sync::atomic::Ordering;

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(REAPER_INTERVAL);

        for builder_id in state.builders().evict_stale(state.config().builder_timeout()) {
            log::error!("builder {builder_id} timed out, marking outstanding TFIDs FAILED");
            for tfid in state.tfs().fail_dispatched_to(&builder_id) {
                log::warn!("tfid {tfid} failed due to stale builder {builder_id}");
                metrics::counter!("scheduler_tf_failed_total").increment(1);
            }
        }

        state.tfs().garbage_collect(state.config().tf_grace_period());
    }
}
