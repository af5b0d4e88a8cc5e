//! The builder's input thread (§4.3 "Finalization", §3 Lifecycle): turns a
//! stream of [`ReadoutFragment`]s into finalized STFs, owning every
//! in-progress `SubTimeFrame` exclusively until it hands the finished
//! object to the pipeline.

use crate::fragment::{ReadoutFragment, ReadoutInterface, RecvOutcome};
use crate::pipeline::BuilderPipeline;
use dd_types::ids::DataIdentifier;
use dd_types::rdh::{self, SanityCheckMode};
use dd_types::{HbFrame, SubTimeFrame, TimeFrameId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Poll tick used while no staleness timer is configured; only governs how
/// responsive the thread is to `stop`, not finalization itself.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct InputConfig {
    pub origin: dd_types::ids::DataOrigin,
    pub sanity_check_mode: SanityCheckMode,
    pub filter_empty_trigger_v4: bool,
    /// `None` means finalize on the explicit end-of-TF marker only
    /// (SPEC_FULL supplement #1).
    pub finalize_after: Option<Duration>,
}

struct InProgress {
    stf: SubTimeFrame,
    last_fragment_at: Instant,
}

/// Runs the builder's input thread until `readout` closes or `stop` flips.
/// Every finalized STF is handed to `pipeline.push_built`.
pub fn run(
    mut readout: impl ReadoutInterface,
    config: InputConfig,
    pipeline: &BuilderPipeline,
    stop: &std::sync::atomic::AtomicBool,
) {
    use std::sync::atomic::Ordering;

    let mut in_progress: HashMap<TimeFrameId, InProgress> = HashMap::new();
    let poll_interval = config.finalize_after.unwrap_or(DEFAULT_POLL_INTERVAL).min(DEFAULT_POLL_INTERVAL);

    while !stop.load(Ordering::Relaxed) {
        match readout.recv(poll_interval) {
            RecvOutcome::Closed => break,
            RecvOutcome::Timeout => {}
            RecvOutcome::Fragment(ReadoutFragment::EndOfTf { tfid }) => {
                if let Some(entry) = in_progress.remove(&tfid) {
                    finalize_and_push(tfid, entry.stf, pipeline);
                } else {
                    log::warn!("end-of-TF marker for unknown tfid {tfid}, ignoring");
                }
            }
            RecvOutcome::Fragment(ReadoutFragment::Hbf {
                tfid,
                origin,
                description,
                subspec,
                rdh_raw,
                payload,
            }) => {
                if config.filter_empty_trigger_v4 && rdh::is_trigger_only_empty_block_v4(payload.len()) {
                    continue;
                }
                if !rdh::sanity_check(&rdh_raw, config.sanity_check_mode) {
                    metrics::counter!("builder_malformed_fragments_total").increment(1);
                    continue;
                }
                let entry = in_progress.entry(tfid).or_insert_with(|| InProgress {
                    stf: SubTimeFrame::new(tfid, config.origin),
                    last_fragment_at: Instant::now(),
                });
                entry.stf.insert(
                    DataIdentifier::new(origin, description),
                    subspec,
                    HbFrame::new(rdh_raw, payload),
                );
                entry.last_fragment_at = Instant::now();
            }
        }

        if let Some(timeout) = config.finalize_after {
            finalize_stale(&mut in_progress, timeout, pipeline);
        }
    }
}

fn finalize_and_push(tfid: TimeFrameId, mut stf: SubTimeFrame, pipeline: &BuilderPipeline) {
    stf.finalize();
    log::trace!("finalized tfid {tfid} with {} HBFrames", stf.n_hbf());
    metrics::counter!("builder_stf_built_total").increment(1);
    pipeline.push_built(stf);
}

fn finalize_stale(in_progress: &mut HashMap<TimeFrameId, InProgress>, timeout: Duration, pipeline: &BuilderPipeline) {
    let now = Instant::now();
    let stale: Vec<TimeFrameId> = in_progress
        .iter()
        .filter(|(_, entry)| now.saturating_duration_since(entry.last_fragment_at) >= timeout)
        .map(|(tfid, _)| *tfid)
        .collect();
    for tfid in stale {
        if let Some(entry) = in_progress.remove(&tfid) {
            log::warn!("tfid {tfid} finalized by staleness timeout ({timeout:?})");
            finalize_and_push(tfid, entry.stf, pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::CrossbeamReadoutSource;
    use dd_types::ids::{DataDescription, DataOrigin, SubSpec};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn builds_one_stf_from_two_hbframes_and_an_end_marker() {
        let (tx, source) = CrossbeamReadoutSource::channel();
        let pipeline = BuilderPipeline::new(false, None);
        let stop = AtomicBool::new(false);

        tx.send(ReadoutFragment::Hbf {
            tfid: TimeFrameId(42),
            origin: DataOrigin::Tpc,
            description: DataDescription::RawData,
            subspec: SubSpec::new(0x10),
            rdh_raw: vec![1, 2, 3, 4, 5, 6, 7, 8],
            payload: vec![0xAA],
        })
        .unwrap();
        tx.send(ReadoutFragment::Hbf {
            tfid: TimeFrameId(42),
            origin: DataOrigin::Tpc,
            description: DataDescription::RawData,
            subspec: SubSpec::new(0x10),
            rdh_raw: vec![1, 2, 3, 4, 5, 6, 7, 8],
            payload: vec![0xBB],
        })
        .unwrap();
        tx.send(ReadoutFragment::EndOfTf { tfid: TimeFrameId(42) }).unwrap();
        drop(tx);

        run(
            source,
            InputConfig {
                origin: DataOrigin::Flp,
                sanity_check_mode: SanityCheckMode::Off,
                filter_empty_trigger_v4: false,
                finalize_after: None,
            },
            &pipeline,
            &stop,
        );

        let stf = pipeline.dequeue_send_in().unwrap();
        assert_eq!(stf.id(), TimeFrameId(42));
        assert_eq!(stf.n_hbf(), 2);
    }

    #[test]
    fn drop_mode_rejects_malformed_fragments() {
        let (tx, source) = CrossbeamReadoutSource::channel();
        let pipeline = BuilderPipeline::new(false, None);
        let stop = AtomicBool::new(false);

        tx.send(ReadoutFragment::Hbf {
            tfid: TimeFrameId(1),
            origin: DataOrigin::Tpc,
            description: DataDescription::RawData,
            subspec: SubSpec::new(0x1),
            rdh_raw: vec![0, 1],
            payload: vec![],
        })
        .unwrap();
        tx.send(ReadoutFragment::EndOfTf { tfid: TimeFrameId(1) }).unwrap();
        drop(tx);

        run(
            source,
            InputConfig {
                origin: DataOrigin::Flp,
                sanity_check_mode: SanityCheckMode::Drop,
                filter_empty_trigger_v4: false,
                finalize_after: None,
            },
            &pipeline,
            &stop,
        );

        assert!(pipeline.dequeue_send_in().is_none());
        let _ = Arc::new(());
    }
}
