//! The builder's two-stage pipeline and drop policy (§4.3).
//!
//! The stage numbering follows the original enum exactly: `BUILD_OUT`
//! (stage 0, the finalized-STF exit of the input thread) doubles as
//! `SINK_IN`; the sink's `SINK_OUT` re-queues into `SEND_IN` (stage 1),
//! the same stage an STF lands in directly when the sink is disabled.
//! There is no dedicated `NULL_IN` queue — dropping is simply not
//! re-queuing an item, matching the Design Note that routing is a plain
//! `(stage, item) -> Option<stage>` closure rather than a class hierarchy.

use dd_pipeline::Pipeline;
use dd_types::SubTimeFrame;

pub const STAGE_SINK_IN: usize = 0;
pub const STAGE_SEND_IN: usize = 1;

/// Owns the two pipeline stages and applies the buffer-limit drop policy
/// (§4.3: "oldest-first, back-to-front drop") on every push.
pub struct BuilderPipeline {
    pipeline: Pipeline<SubTimeFrame>,
    sink_enabled: bool,
    max_buffered: Option<u64>,
}

impl BuilderPipeline {
    pub fn new(sink_enabled: bool, max_buffered: Option<u64>) -> Self {
        Self {
            pipeline: Pipeline::new(2),
            sink_enabled,
            max_buffered,
        }
    }

    /// The input thread's exit point for a freshly finalized STF: routes to
    /// `SINK_IN` if the sink is enabled, otherwise straight to `SEND_IN`,
    /// then enforces `maxBuffered`.
    pub fn push_built(&self, stf: SubTimeFrame) {
        let stage = if self.sink_enabled { STAGE_SINK_IN } else { STAGE_SEND_IN };
        self.pipeline.queue(stage, stf);
        self.enforce_cap();
    }

    /// The sink thread's exit point after writing an STF to disk (§4.3
    /// `nextStage`: `SINK_OUT -> SEND_IN`).
    pub fn sink_done(&self, stf: SubTimeFrame) {
        self.pipeline.queue(STAGE_SEND_IN, stf);
        self.enforce_cap();
    }

    pub fn dequeue_sink_in(&self) -> Option<SubTimeFrame> {
        self.pipeline.dequeue(STAGE_SINK_IN)
    }

    pub fn dequeue_send_in(&self) -> Option<SubTimeFrame> {
        self.pipeline.dequeue(STAGE_SEND_IN)
    }

    pub fn stop(&self) {
        self.pipeline.stop();
    }

    pub fn in_flight(&self) -> usize {
        self.pipeline.total_size()
    }

    /// §4.3 buffer limit: while the in-flight count exceeds `maxBuffered`,
    /// try to pop one item starting from the stage closest to the exit
    /// (`SEND_IN`), falling back to `SINK_IN`. Each successful pop drops one
    /// STF and decrements the count by construction (it leaves a queue).
    fn enforce_cap(&self) {
        let Some(cap) = self.max_buffered else { return };
        while self.pipeline.total_size() as u64 > cap {
            if !self.try_pop_oldest() {
                break;
            }
            log::warn!("dropping oldest buffered STF: maxBuffered={cap} reached");
            metrics::counter!("builder_stf_dropped_total").increment(1);
        }
    }

    fn try_pop_oldest(&self) -> bool {
        self.pipeline.try_pop(STAGE_SEND_IN).is_some() || self.pipeline.try_pop(STAGE_SINK_IN).is_some()
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
    fn drops_oldest_from_send_in_when_cap_exceeded() {
        let p = BuilderPipeline::new(false, Some(4));
        for tfid in 1..=6 {
            p.push_built(stf(tfid));
        }
        assert_eq!(p.in_flight(), 4);
        let mut remaining = Vec::new();
        while let Some(s) = p.pipeline.try_pop(STAGE_SEND_IN) {
            remaining.push(s.id().0);
        }
        assert_eq!(remaining, vec![3, 4, 5, 6]);
    }

    #[test]
    fn sink_enabled_routes_build_out_to_sink_in() {
        let p = BuilderPipeline::new(true, None);
        p.push_built(stf(1));
        assert_eq!(p.dequeue_sink_in().unwrap().id(), TimeFrameId(1));
        assert_eq!(p.pipeline.try_pop(STAGE_SEND_IN), None);
    }

    #[test]
    fn sink_done_forwards_to_send_in() {
        let p = BuilderPipeline::new(true, None);
        p.sink_done(stf(1));
        assert_eq!(p.dequeue_send_in().unwrap().id(), TimeFrameId(1));
    }

    #[test]
    fn uncapped_when_max_buffered_is_none() {
        let p = BuilderPipeline::new(false, None);
        for tfid in 1..=10 {
            p.push_built(stf(tfid));
        }
        assert_eq!(p.in_flight(), 10);
    }
}
