//! The readout input interface (§4.3, §1 "out of scope collaborators": the
//! raw RDH format and the process that produces fragments). This crate only
//! specifies the shape of a fragment and ships one concrete, in-process
//! source backed by a `crossbeam` channel — good enough for standalone runs
//! and tests; a real deployment plugs in a readout-specific implementation.

use dd_types::ids::{DataDescription, DataOrigin, SubSpec};
use dd_types::TimeFrameId;

/// One readout fragment, or the end-of-TF marker that finalizes a TFID
/// (§3 Lifecycle: "constructed empty when the first fragment with a new
/// TFID arrives... finalized [on] end-of-TF marker").
#[derive(Clone, Debug)]
pub enum ReadoutFragment {
    Hbf {
        tfid: TimeFrameId,
        origin: DataOrigin,
        description: DataDescription,
        subspec: SubSpec,
        /// Raw RDH buffer, sanity-checked by `dd_types::rdh` before this
        /// reaches the builder's input thread.
        rdh_raw: Vec<u8>,
        payload: Vec<u8>,
    },
    EndOfTf {
        tfid: TimeFrameId,
    },
}

impl ReadoutFragment {
    pub fn tfid(&self) -> TimeFrameId {
        match self {
            ReadoutFragment::Hbf { tfid, .. } => *tfid,
            ReadoutFragment::EndOfTf { tfid } => *tfid,
        }
    }
}

/// Outcome of one poll against a [`ReadoutInterface`]: a fragment, a
/// recv-timeout with nothing available (the input thread uses this tick to
/// re-check the staleness timer), or the source closing for good.
pub enum RecvOutcome {
    Fragment(ReadoutFragment),
    Timeout,
    Closed,
}

/// The input interface the builder's input thread polls, mirroring the
/// original `StfInputInterface`'s poll-with-timeout loop (20ms in the
/// source) rather than an unbounded blocking `recv`, so the thread stays
/// responsive to shutdown and to the optional staleness timer (§3
/// Lifecycle) even when no new fragment has arrived.
pub trait ReadoutInterface: Send {
    fn recv(&mut self, timeout: std::time::Duration) -> RecvOutcome;
}

/// A `crossbeam`-channel-backed [`ReadoutInterface`]. The paired
/// [`crossbeam::channel::Sender`] is the injection point for a real readout
/// process (or a test harness).
pub struct CrossbeamReadoutSource {
    rx: crossbeam::channel::Receiver<ReadoutFragment>,
}

impl CrossbeamReadoutSource {
    pub fn new(rx: crossbeam::channel::Receiver<ReadoutFragment>) -> Self {
        Self { rx }
    }

    /// Convenience constructor returning both ends, for tests and
    /// standalone demos that feed fragments in-process.
    pub fn channel() -> (crossbeam::channel::Sender<ReadoutFragment>, Self) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (tx, Self::new(rx))
    }
}

impl ReadoutInterface for CrossbeamReadoutSource {
    fn recv(&mut self, timeout: std::time::Duration) -> RecvOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(fragment) => RecvOutcome::Fragment(fragment),
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => RecvOutcome::Timeout,
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => RecvOutcome::Closed,
        }
    }
}
