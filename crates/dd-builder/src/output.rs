//! The builder's output thread (§4.3 "Output stage"): dequeues finalized
//! STFs from `SEND_IN` and disposes of them according to the selected
//! [`OutputMode`].

use crate::config::OutputMode;
use crate::pipeline::BuilderPipeline;
use dd_transport::Channel;
use dd_types::SubTimeFrame;

/// Encodes and transmits one finalized STF over `channel` (§4.2 wire
/// format). Used for both the `Direct` and `Bridged` output modes; they
/// differ only in which endpoint `channel` is connected to, decided once at
/// startup by the caller.
pub fn send_one(channel: &mut dyn Channel, stf: &SubTimeFrame) -> Result<(), dd_types::CodecError> {
    let parts = dd_types::encode(stf)?;
    if let Err(e) = channel.send(parts) {
        log::error!("failed to send stf {}: {e}", stf.id());
    }
    Ok(())
}

/// Runs the builder's output thread until `pipeline.stop()` is called and
/// `SEND_IN` drains. `channel` is `None` for [`OutputMode::Standalone`]; the
/// caller is responsible for constructing the right channel for
/// `Direct`/`Bridged` before calling this.
pub fn run(pipeline: &BuilderPipeline, mode: OutputMode, mut channel: Option<Box<dyn Channel + Send>>) {
    while let Some(stf) = pipeline.dequeue_send_in() {
        match mode {
            OutputMode::Standalone => {
                log::trace!("standalone run: discarding built stf {}", stf.id());
                metrics::counter!("builder_stf_discarded_total").increment(1);
            }
            OutputMode::Direct | OutputMode::Bridged => {
                let channel = channel.as_deref_mut().expect("Direct/Bridged modes require a channel");
                if let Err(e) = send_one(channel, &stf) {
                    log::error!("failed to encode stf {}: {e}", stf.id());
                }
                metrics::counter!("builder_stf_sent_total").increment(1);
            }
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

    #[test]
    fn standalone_mode_drains_without_a_channel() {
        let pipeline = BuilderPipeline::new(false, None);
        pipeline.push_built(stf(1));
        pipeline.push_built(stf(2));
        pipeline.stop();

        run(&pipeline, OutputMode::Standalone, None);

        assert_eq!(pipeline.dequeue_send_in(), None);
    }
}
