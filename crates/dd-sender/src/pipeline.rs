//! The sender's two-stage pipeline (§4.1, §4.4): received STFs flow
//! `RECV_OUT -> [SINK_IN ->] DISPATCH_IN`, reusing the same staged-pipeline
//! abstraction as the builder. There is no buffer-limit drop policy here —
//! §4.4 has no analogue to the builder's `maxBuffered`; back-pressure is
//! left to the scheduler's `Backoff` signal instead.

use dd_pipeline::Pipeline;
use dd_types::SubTimeFrame;

pub const STAGE_SINK_IN: usize = 0;
pub const STAGE_DISPATCH_IN: usize = 1;

pub struct SenderPipeline {
    pipeline: Pipeline<SubTimeFrame>,
    sink_enabled: bool,
}

impl SenderPipeline {
    pub fn new(sink_enabled: bool) -> Self {
        Self {
            pipeline: Pipeline::new(2),
            sink_enabled,
        }
    }

    /// The receiver thread's exit point for a freshly decoded STF.
    pub fn push_received(&self, stf: SubTimeFrame) {
        let stage = if self.sink_enabled { STAGE_SINK_IN } else { STAGE_DISPATCH_IN };
        self.pipeline.queue(stage, stf);
    }

    pub fn sink_done(&self, stf: SubTimeFrame) {
        self.pipeline.queue(STAGE_DISPATCH_IN, stf);
    }

    pub fn dequeue_sink_in(&self) -> Option<SubTimeFrame> {
        self.pipeline.dequeue(STAGE_SINK_IN)
    }

    pub fn dequeue_dispatch_in(&self) -> Option<SubTimeFrame> {
        self.pipeline.dequeue(STAGE_DISPATCH_IN)
    }

    pub fn stop(&self) {
        self.pipeline.stop();
    }

    pub fn in_flight(&self) -> usize {
        self.pipeline.total_size()
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
    fn sink_disabled_routes_straight_to_dispatch_in() {
        let p = SenderPipeline::new(false);
        p.push_received(stf(1));
        assert_eq!(p.dequeue_dispatch_in().unwrap().id(), TimeFrameId(1));
    }

    #[test]
    fn sink_enabled_routes_to_sink_in_first() {
        let p = SenderPipeline::new(true);
        p.push_received(stf(1));
        assert_eq!(p.dequeue_sink_in().unwrap().id(), TimeFrameId(1));
        assert_eq!(p.in_flight(), 0);
    }

    #[test]
    fn sink_done_forwards_to_dispatch_in() {
        let p = SenderPipeline::new(true);
        p.sink_done(stf(1));
        assert_eq!(p.dequeue_dispatch_in().unwrap().id(), TimeFrameId(1));
    }
}
