//! STF Sender role (§4.4): receives built STFs from upstream builders,
//! reports each one's arrival to the TF Scheduler, and forwards it to
//! whichever builder endpoint gets assigned.
//!
//! Startup order (SPEC_FULL supplement #3, mirroring
//! `StfSenderDevice::PreRun`): scheduler client reachability check first
//! (retried every 250ms), then the dispatch thread starts, then this
//! sender's own TCP listener binds and publishes its address via the
//! registry, then the optional file sink starts, then the receiver thread
//! starts accepting builder connections. Shutdown is the exact mirror.

pub mod config;
pub mod dispatch;
pub mod receiver;
pub mod pipeline;

pub use config::{Cli, ConfigError, SenderConfig};
pub use dispatch::Dispatcher;
pub use pipeline::SenderPipeline;

use dd_transport::rpc_client::SchedulerClient;
use dd_transport::{Registry, TcpChannelListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SCHEDULER_REACHABILITY_RETRY: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum SenderError {
    #[error("failed to bind sender listener on {0}: {1}")]
    Bind(String, dd_transport::ChannelError),
    #[error("failed to publish sender endpoint to registry: {0}")]
    Registry(#[from] dd_transport::RegistryError),
}

/// Blocks until the scheduler answers `num_stf_senders`, retrying every
/// [`SCHEDULER_REACHABILITY_RETRY`]. Mirrors a role's startup sequencing
/// against a scheduler that may not be up yet (same idiom as
/// `SchedulerClient::connect_with_retry`, used here because the sender has
/// no analogous "connect" RPC of its own).
fn wait_for_scheduler(scheduler: &SchedulerClient, envelope: &dd_types::rpc::RequestEnvelope) {
    loop {
        match scheduler.num_stf_senders(envelope.clone()) {
            Ok(_) => return,
            Err(e) => {
                log::warn!("scheduler not reachable yet, retrying: {e}");
                std::thread::sleep(SCHEDULER_REACHABILITY_RETRY);
            }
        }
    }
}

/// Runs the sender to completion, following the startup sequencing
/// documented on this module, and blocks until `stop` is set and every
/// stage has drained.
pub fn run(config: SenderConfig, registry: &dyn Registry, stop: Arc<AtomicBool>) -> Result<(), SenderError> {
    let envelope = config.envelope();
    let scheduler = SchedulerClient::new(config.scheduler_url.clone());
    wait_for_scheduler(&scheduler, &envelope);

    let pipeline = Arc::new(SenderPipeline::new(config.sink_enable));

    let dispatcher = Dispatcher::new(scheduler, envelope, config.sender_id.clone());
    let dispatch_pipeline = pipeline.clone();
    let dispatch_handle = std::thread::spawn(move || dispatch::run(&dispatch_pipeline, &dispatcher));

    let listener = TcpChannelListener::bind(&config.bind)
        .map_err(|e| SenderError::Bind(config.bind.clone(), e))?;
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| config.bind.clone());
    registry.put(&format!("sender/{}", config.channel_name), &local_addr)?;
    log::info!("sender {} listening on {local_addr}, published as sender/{}", config.sender_id, config.channel_name);

    let sink_handle = if config.sink_enable {
        let sink_pipeline = pipeline.clone();
        let sink_config = config.sink_config();
        Some(std::thread::spawn(move || run_sink(sink_pipeline, sink_config)))
    } else {
        None
    };

    let recv_pipeline = pipeline.clone();
    let on_received: Arc<dyn Fn(dd_types::SubTimeFrame) + Send + Sync> =
        Arc::new(move |stf| recv_pipeline.push_received(stf));
    let receiver_stop = stop.clone();
    receiver::run(listener, on_received, receiver_stop);

    pipeline.stop();
    if let Some(handle) = sink_handle {
        let _ = handle.join();
    }
    let _ = dispatch_handle.join();
    let _ = registry.remove(&format!("sender/{}", config.channel_name));

    Ok(())
}

fn run_sink(pipeline: Arc<SenderPipeline>, sink_config: dd_storage::FileSinkConfig) {
    let mut sink = match dd_storage::FileSink::open(sink_config) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("failed to open file sink, sink stage will drop every STF: {e}");
            while pipeline.dequeue_sink_in().is_some() {}
            return;
        }
    };

    while let Some(stf) = pipeline.dequeue_sink_in() {
        if let Err(e) = sink.write(&stf) {
            log::error!("file sink write failed for tfid {}: {e}", stf.id());
        }
        pipeline.sink_done(stf);
    }
}
