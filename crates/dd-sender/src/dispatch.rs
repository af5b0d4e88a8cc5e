//! The sender's output/dispatch thread (§4.4): reports each received STF's
//! arrival to the TF Scheduler, then forwards it to whichever builder
//! endpoint the scheduler assigns.
//!
//! At-most-once per TFID: once a TFID has been hand off to
//! [`dispatch_one`] (successfully or not), this module never looks at it
//! again — there is no retry loop here, matching §4.4's delivery
//! invariant. A `BuilderUnreachable` failure is reported via `send_failed`
//! and the STF is discarded, never re-queued.

use dd_transport::rpc_client::SchedulerClient;
use dd_transport::{Channel, TcpChannel};
use dd_types::rpc::{RequestEnvelope, StfUpdateResult};
use dd_types::SubTimeFrame;

pub struct Dispatcher {
    scheduler: SchedulerClient,
    envelope: RequestEnvelope,
    sender_id: String,
}

impl Dispatcher {
    pub fn new(scheduler: SchedulerClient, envelope: RequestEnvelope, sender_id: String) -> Self {
        Self {
            scheduler,
            envelope,
            sender_id,
        }
    }

    /// Reports `stf`'s arrival, then sends it to the assigned builder
    /// endpoint (§4.4 "on-command transmit"). Returns `Ok(())` once the STF
    /// has been disposed of one way or another: assigned-and-sent,
    /// assigned-but-unreachable (reported via `send-failed`), or
    /// permanently `Failed` by the scheduler.
    pub fn dispatch_one(&self, stf: &SubTimeFrame) -> Result<(), dd_transport::rpc_client::RpcError> {
        let tfid = stf.id();
        let bytes = stf.data_size() as u64;

        let resp = self
            .scheduler
            .stf_update_until_assigned(self.envelope.clone(), &self.sender_id, tfid, bytes)?;

        match resp.result {
            StfUpdateResult::Assigned => {
                let endpoint = resp.builder_endpoint.as_deref().unwrap_or_default();
                match self.send_to_builder(endpoint, stf) {
                    Ok(()) => {
                        metrics::counter!("sender_stf_dispatched_total").increment(1);
                    }
                    Err(e) => {
                        log::error!("builder at {endpoint} unreachable for tfid {tfid}: {e}");
                        metrics::counter!("sender_stf_builder_unreachable_total").increment(1);
                        self.scheduler
                            .send_failed(self.envelope.clone(), &self.sender_id, tfid)?;
                    }
                }
            }
            StfUpdateResult::Failed => {
                log::warn!("scheduler permanently failed tfid {tfid}, discarding");
                metrics::counter!("sender_stf_scheduler_failed_total").increment(1);
            }
            StfUpdateResult::NotReady | StfUpdateResult::Backoff => {
                unreachable!("stf_update_until_assigned only returns once Assigned or Failed")
            }
        }

        Ok(())
    }

    fn send_to_builder(&self, endpoint: &str, stf: &SubTimeFrame) -> Result<(), dd_transport::ChannelError> {
        let mut channel = TcpChannel::connect(endpoint)?;
        let parts = dd_types::encode(stf).map_err(|e| {
            dd_transport::ChannelError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })?;
        channel.send(parts)
    }
}

/// Runs the dispatch thread until `pipeline` is stopped and drained.
pub fn run(pipeline: &crate::SenderPipeline, dispatcher: &Dispatcher) {
    while let Some(stf) = pipeline.dequeue_dispatch_in() {
        if let Err(e) = dispatcher.dispatch_one(&stf) {
            log::error!("scheduler rpc failed for tfid {}, discarding: {e}", stf.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_types::ids::DataOrigin;
    use dd_types::TimeFrameId;

    fn stf(tfid: u64) -> SubTimeFrame {
        let mut s = SubTimeFrame::new(TimeFrameId(tfid), DataOrigin::Tpc);
        s.finalize();
        s
    }

    /// An assigned endpoint nobody is listening on should surface as a
    /// `ChannelError`, never a panic, so `dispatch_one` can report
    /// `send-failed` instead of propagating it.
    #[test]
    fn send_to_builder_reports_connection_refused_as_channel_error() {
        let dispatcher = Dispatcher::new(
            SchedulerClient::new("http://127.0.0.1:1"),
            RequestEnvelope {
                process_id: "sender-0".into(),
                partition_id: "p0".into(),
            },
            "sender-0".into(),
        );
        let err = dispatcher.send_to_builder("127.0.0.1:1", &stf(1)).unwrap_err();
        assert!(matches!(err, dd_transport::ChannelError::Io(_)));
    }
}
