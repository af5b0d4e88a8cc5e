//! STF Builder role (§4.3): turns a stream of readout fragments into
//! finalized [`dd_types::SubTimeFrame`]s, optionally writes them to disk,
//! and forwards them downstream to an STF Sender.
//!
//! The binary in `src/bin/main.rs` is a thin wrapper: parse config, resolve
//! the output endpoint if one is needed, spawn the input/sink/output
//! threads, then join them on shutdown.

pub mod config;
pub mod fragment;
pub mod input;
pub mod output;
pub mod pipeline;

pub use config::{BuilderConfig, Cli, ConfigError, OutputMode};
pub use fragment::{CrossbeamReadoutSource, ReadoutFragment, ReadoutInterface, RecvOutcome};
pub use pipeline::BuilderPipeline;

use dd_transport::{Channel, TcpChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interval between endpoint-resolution attempts while the configured
/// downstream sender has not yet published its address, mirroring
/// `dd_transport::rpc_client::SchedulerClient`'s connect retry cadence.
const RESOLVE_RETRY_INTERVAL: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    #[error("storage error: {0}")]
    Storage(#[from] dd_storage::StorageError),
    #[error("channel error: {0}")]
    Channel(#[from] dd_transport::ChannelError),
}

/// Resolves a downstream channel name to a connected [`TcpChannel`] by
/// polling `registry` for `sender/{channel_name}`, retrying until found.
pub fn resolve_output_channel(
    registry: &dyn dd_transport::Registry,
    channel_name: &str,
) -> Result<TcpChannel, dd_transport::RegistryError> {
    let key = format!("sender/{channel_name}");
    loop {
        if let Some(addr) = registry.get(&key)? {
            match TcpChannel::connect(addr.as_str()) {
                Ok(channel) => return Ok(channel),
                Err(e) => log::warn!("failed to connect to downstream sender at {addr}: {e}"),
            }
        } else {
            log::debug!("waiting for {key} to be published in the registry");
        }
        std::thread::sleep(RESOLVE_RETRY_INTERVAL);
    }
}

/// Runs the builder to completion: spawns the input thread over `readout`,
/// an optional file-sink thread, and the output thread, then blocks until
/// `stop` is set and every thread has drained.
///
/// `output_channel` is `None` for [`OutputMode::Standalone`]; the caller
/// resolves and connects it (e.g. via [`resolve_output_channel`]) before
/// calling `run`, since that step may itself block on discovery.
pub fn run(
    readout: impl ReadoutInterface + 'static,
    config: BuilderConfig,
    output_channel: Option<Box<dyn Channel + Send>>,
    stop: Arc<AtomicBool>,
) -> Result<(), BuilderError> {
    let pipeline = Arc::new(BuilderPipeline::new(config.sink_enable, config.effective_max_buffered()));

    let sink_handle = if config.sink_enable {
        let sink_pipeline = pipeline.clone();
        let sink_config = config.sink_config();
        Some(std::thread::spawn(move || run_sink(sink_pipeline, sink_config)))
    } else {
        None
    };

    let output_pipeline = pipeline.clone();
    let mode = config.output_mode();
    let output_handle = std::thread::spawn(move || output::run(&output_pipeline, mode, output_channel));

    let input_config = input::InputConfig {
        origin: config.detector_origin(),
        sanity_check_mode: config.sanity_check_mode(),
        filter_empty_trigger_v4: config.rdh_filter_empty_trigger_v4,
        finalize_after: config.finalize_after(),
    };
    input::run(readout, input_config, &pipeline, &stop);

    pipeline.stop();
    if let Some(handle) = sink_handle {
        let _ = handle.join();
    }
    let _ = output_handle.join();

    Ok(())
}

fn run_sink(pipeline: Arc<BuilderPipeline>, sink_config: dd_storage::FileSinkConfig) {
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
