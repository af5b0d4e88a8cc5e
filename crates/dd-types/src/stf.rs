//! The in-memory Sub-Time-Frame aggregate (§3) and its mutation API.
//!
//! A [`SubTimeFrame`] is built exclusively by the owning builder's input
//! thread, then handed through the pipeline by ownership transfer once
//! finalized. Nothing here is `Sync`; callers move the value between
//! threads via [`crate::pipeline`]-style channels, they never share a
//! reference to a mutable STF.

use crate::ids::{DataIdentifier, SubSpec, TimeFrameId};
use std::collections::BTreeMap;

/// One detector readout fragment: an opaque header buffer and an opaque
/// payload buffer, both owned by the STF that holds them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HbFrame {
    pub header_buf: Vec<u8>,
    pub payload_buf: Vec<u8>,
}

impl HbFrame {
    pub fn new(header_buf: Vec<u8>, payload_buf: Vec<u8>) -> Self {
        Self {
            header_buf,
            payload_buf,
        }
    }

    pub fn total_len(&self) -> usize {
        self.header_buf.len() + self.payload_buf.len()
    }
}

/// `{id, origin}` carried once per STF.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StfHeader {
    pub id: TimeFrameId,
    pub origin: crate::ids::DataOrigin,
}

/// A single FLP's contribution to one Time-Frame.
///
/// Invariants (enforced by construction, never by the caller):
/// - All HBFrames carry the same `id` as `header.id`.
/// - Within one `(origin, description, subspec)` bucket, insertion order is
///   preserved (a `Vec`, never reordered).
/// - After [`SubTimeFrame::finalize`] the object is logically immutable;
///   `insert` panics if called afterwards — an `AssertionViolation` per §7,
///   since that would be a bug in the caller, not an operational condition.
#[derive(Clone, Debug)]
pub struct SubTimeFrame {
    pub header: StfHeader,
    data: BTreeMap<DataIdentifier, BTreeMap<SubSpec, Vec<HbFrame>>>,
    finalized: bool,
}

impl SubTimeFrame {
    /// Constructs an empty STF for a newly observed TFID. The builder's
    /// input thread is the only caller.
    pub fn new(id: TimeFrameId, origin: crate::ids::DataOrigin) -> Self {
        Self {
            header: StfHeader { id, origin },
            data: BTreeMap::new(),
            finalized: false,
        }
    }

    pub fn id(&self) -> TimeFrameId {
        self.header.id
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Appends `frame` to the `(data_id, subspec)` bucket, preserving
    /// insertion order within the bucket.
    ///
    /// # Panics
    /// If the STF has already been finalized.
    pub fn insert(&mut self, data_id: DataIdentifier, subspec: SubSpec, frame: HbFrame) {
        assert!(
            !self.finalized,
            "AssertionViolation: insert into a finalized SubTimeFrame"
        );
        self.data.entry(data_id).or_default().entry(subspec).or_default().push(frame);
    }

    /// Marks the STF as complete, either because the readout sent the
    /// end-of-TF marker or because a staleness timeout elapsed (§3
    /// Lifecycle). Thereafter the STF is handed through the pipeline by
    /// ownership transfer only.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&DataIdentifier, &BTreeMap<SubSpec, Vec<HbFrame>>)> {
        self.data.iter()
    }

    pub fn n_hbf(&self) -> usize {
        self.data
            .values()
            .flat_map(|bucket| bucket.values())
            .map(|frames| frames.len())
            .sum()
    }

    pub fn data_size(&self) -> usize {
        self.data
            .values()
            .flat_map(|bucket| bucket.values())
            .flat_map(|frames| frames.iter())
            .map(HbFrame::total_len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DataDescription, DataOrigin};

    #[test]
    fn insert_preserves_bucket_order() {
        let mut stf = SubTimeFrame::new(TimeFrameId(42), DataOrigin::Flp);
        let id = DataIdentifier::new(DataOrigin::Tpc, DataDescription::RawData);
        let subspec = SubSpec::new(0x10);
        stf.insert(id, subspec, HbFrame::new(vec![1], vec![10]));
        stf.insert(id, subspec, HbFrame::new(vec![2], vec![20]));
        stf.finalize();

        let (_, bucket) = stf.buckets().next().unwrap();
        let frames = &bucket[&subspec];
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header_buf, vec![1]);
        assert_eq!(frames[1].header_buf, vec![2]);
        assert_eq!(stf.n_hbf(), 2);
    }

    #[test]
    #[should_panic(expected = "AssertionViolation")]
    fn insert_after_finalize_panics() {
        let mut stf = SubTimeFrame::new(TimeFrameId(1), DataOrigin::Flp);
        stf.finalize();
        stf.insert(
            DataIdentifier::stf_header(),
            SubSpec::new(0),
            HbFrame::new(vec![], vec![]),
        );
    }
}
