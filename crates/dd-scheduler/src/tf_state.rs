//! The per-TFID state machine (§4.6): `PENDING -> READY -> DISPATCHED ->
//! (COMPLETE | FAILED)`, protected by a single mutex (§5).
//!
//! Every sender in a partition independently calls `StfSenderStfUpdate`
//! until it observes `Assigned` or `Failed` in the response (the wire
//! protocol of §6 has no scheduler-initiated operation, so the "fan-out"
//! described in §4.6 step 3 is realized as every sender's own poll
//! observing the same state once dispatched — see this crate's design
//! ledger).

use dd_types::rpc::StfUpdateResult;
use dd_types::TimeFrameId;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TfState {
    Pending,
    Ready,
    Dispatched,
    Complete,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TfRecord {
    pub tfid: TimeFrameId,
    pub contribs: HashSet<String>,
    pub bytes: u64,
    pub state: TfState,
    pub assigned_builder: Option<String>,
    terminal_since: Option<Instant>,
}

impl TfRecord {
    fn new(tfid: TimeFrameId) -> Self {
        Self {
            tfid,
            contribs: HashSet::new(),
            bytes: 0,
            state: TfState::Pending,
            assigned_builder: None,
            terminal_since: None,
        }
    }
}

/// The scheduler's TFID -> [`TfRecord`] table.
#[derive(Default)]
pub struct TfTable {
    records: std::sync::Mutex<HashMap<TimeFrameId, TfRecord>>,
}

impl TfTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sender's contribution (§4.6 `StfSenderStfUpdate`).
    /// Transitions `PENDING -> READY` once `contribs.len() == expected`.
    /// Returns the state after the update and whether this call caused the
    /// READY transition (so the caller knows to attempt assignment).
    pub fn record_contribution(
        &self,
        tfid: TimeFrameId,
        sender_id: &str,
        bytes: u64,
        expected_contribs: usize,
    ) -> (TfState, bool) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(tfid).or_insert_with(|| TfRecord::new(tfid));
        let already_ready = record.state != TfState::Pending;
        record.contribs.insert(sender_id.to_string());
        record.bytes += bytes;
        if !already_ready && record.contribs.len() >= expected_contribs {
            record.state = TfState::Ready;
            return (record.state, true);
        }
        (record.state, false)
    }

    pub fn state_of(&self, tfid: TimeFrameId) -> Option<TfState> {
        self.records.lock().unwrap().get(&tfid).map(|r| r.state)
    }

    /// §4.6 step 3: marks a READY TFID DISPATCHED with its assigned builder.
    pub fn dispatch(&self, tfid: TimeFrameId, builder_id: &str) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&tfid) {
            record.state = TfState::Dispatched;
            record.assigned_builder = Some(builder_id.to_string());
        }
    }

    /// The caller-facing result for a `StfSenderStfUpdate` response: the
    /// dispatched builder's endpoint once assigned, or the current
    /// not-ready/failed status.
    pub fn poll_result(&self, tfid: TimeFrameId) -> StfUpdateResult {
        match self.records.lock().unwrap().get(&tfid).map(|r| r.state) {
            Some(TfState::Dispatched) | Some(TfState::Complete) => StfUpdateResult::Assigned,
            Some(TfState::Failed) => StfUpdateResult::Failed,
            _ => StfUpdateResult::NotReady,
        }
    }

    pub fn assigned_builder(&self, tfid: TimeFrameId) -> Option<String> {
        self.records.lock().unwrap().get(&tfid).and_then(|r| r.assigned_builder.clone())
    }

    /// §4.6 step 4 / §7 `BuilderUnreachable`: marks a TFID FAILED after a
    /// sender reports `SendFailed`. Returns the builder that should have its
    /// `freeBuffers` restored, if one was assigned.
    pub fn mark_failed(&self, tfid: TimeFrameId) -> Option<String> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&tfid)?;
        let builder = record.assigned_builder.take();
        record.state = TfState::Failed;
        record.terminal_since = Some(Instant::now());
        builder
    }

    /// §4.6 Builder timeout: fails every TFID dispatched to a now-stale
    /// builder, returning the affected TFIDs.
    pub fn fail_dispatched_to(&self, builder_id: &str) -> Vec<TimeFrameId> {
        let mut records = self.records.lock().unwrap();
        let mut failed = Vec::new();
        for record in records.values_mut() {
            if record.state == TfState::Dispatched && record.assigned_builder.as_deref() == Some(builder_id) {
                record.state = TfState::Failed;
                record.terminal_since = Some(Instant::now());
                failed.push(record.tfid);
            }
        }
        failed
    }

    /// Infers COMPLETE from a builder's free-buffer count rising back for a
    /// TFID it had dispatched (§4.6: "`COMPLETE` is inferred from builder
    /// update decrementing its in-flight set").
    pub fn mark_complete(&self, tfid: TimeFrameId) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&tfid) {
            if record.state == TfState::Dispatched {
                record.state = TfState::Complete;
                record.terminal_since = Some(Instant::now());
            }
        }
    }

    /// Garbage-collects terminal (COMPLETE/FAILED) records older than
    /// `grace_period`.
    pub fn garbage_collect(&self, grace_period: Duration) {
        let mut records = self.records.lock().unwrap();
        let now = Instant::now();
        records.retain(|_, record| match record.terminal_since {
            Some(since) => now.saturating_duration_since(since) < grace_period,
            None => true,
        });
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_ready_only_after_expected_contribs() {
        let table = TfTable::new();
        let tfid = TimeFrameId(1);
        let (state, became_ready) = table.record_contribution(tfid, "s1", 10, 3);
        assert_eq!(state, TfState::Pending);
        assert!(!became_ready);
        table.record_contribution(tfid, "s2", 10, 3);
        let (state, became_ready) = table.record_contribution(tfid, "s3", 10, 3);
        assert_eq!(state, TfState::Ready);
        assert!(became_ready);
    }

    #[test]
    fn dispatch_then_send_failed_restores_and_fails() {
        let table = TfTable::new();
        let tfid = TimeFrameId(1);
        table.record_contribution(tfid, "s1", 10, 1);
        table.dispatch(tfid, "b1");
        assert_eq!(table.poll_result(tfid), StfUpdateResult::Assigned);
        let restored = table.mark_failed(tfid);
        assert_eq!(restored, Some("b1".to_string()));
        assert_eq!(table.poll_result(tfid), StfUpdateResult::Failed);
    }

    #[test]
    fn garbage_collects_only_terminal_records_past_grace_period() {
        let table = TfTable::new();
        table.record_contribution(TimeFrameId(1), "s1", 0, 1);
        table.dispatch(TimeFrameId(1), "b1");
        table.mark_complete(TimeFrameId(1));
        std::thread::sleep(Duration::from_millis(20));
        table.garbage_collect(Duration::from_millis(5));
        assert_eq!(table.len(), 0);
    }
}
