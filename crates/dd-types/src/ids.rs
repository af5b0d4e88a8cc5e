//! Identifiers shared by every role: the Time-Frame id, the detector
//! origin tag, and the `(origin, description, subspec)` triple that keys
//! a single bucket of HBFrames inside a [`crate::stf::SubTimeFrame`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing Time-Frame identifier, assigned by the readout.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TimeFrameId(pub u64);

impl fmt::Display for TimeFrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TimeFrameId {
    fn from(v: u64) -> Self {
        TimeFrameId(v)
    }
}

/// Detector tag carried in every STF header and every `DataHeader`.
///
/// `Flp` is the origin stamped on the synthetic STF-header message itself
/// (see §4.2); the rest name the detector subsystems that contribute data.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum DataOrigin {
    Flp,
    Tpc,
    Its,
    Tof,
    Trd,
    Emc,
    Other(u32),
}

impl DataOrigin {
    pub fn as_tag(&self) -> u32 {
        match self {
            DataOrigin::Flp => 0,
            DataOrigin::Tpc => 1,
            DataOrigin::Its => 2,
            DataOrigin::Tof => 3,
            DataOrigin::Trd => 4,
            DataOrigin::Emc => 5,
            DataOrigin::Other(tag) => *tag,
        }
    }

    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => DataOrigin::Flp,
            1 => DataOrigin::Tpc,
            2 => DataOrigin::Its,
            3 => DataOrigin::Tof,
            4 => DataOrigin::Trd,
            5 => DataOrigin::Emc,
            other => DataOrigin::Other(other),
        }
    }
}

/// Payload kind within an origin, e.g. `RAWDATA` vs the synthetic
/// `SUBTIMEFRAME` description used for the STF header message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum DataDescription {
    Subtimeframe,
    RawData,
    Other(u32),
}

impl DataDescription {
    pub fn as_tag(&self) -> u32 {
        match self {
            DataDescription::Subtimeframe => 0,
            DataDescription::RawData => 1,
            DataDescription::Other(tag) => *tag,
        }
    }

    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => DataDescription::Subtimeframe,
            1 => DataDescription::RawData,
            other => DataDescription::Other(other),
        }
    }
}

/// `(origin, description)` pair identifying one bucket family within an STF.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DataIdentifier {
    pub origin: DataOrigin,
    pub description: DataDescription,
}

impl DataIdentifier {
    pub fn new(origin: DataOrigin, description: DataDescription) -> Self {
        Self { origin, description }
    }

    /// The identifier the synthetic STF-header message always carries
    /// (§4.2: "first `DataHeader` carries `(origin=FLP, description=SUBTIMEFRAME, subspec=0)`").
    pub fn stf_header() -> Self {
        Self::new(DataOrigin::Flp, DataDescription::Subtimeframe)
    }
}

/// 64-bit sub-specification tag. The original high 32 bits are preserved
/// across the per-STF uniqueness rewrite described in §4.2.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SubSpec(pub u64);

impl SubSpec {
    pub fn new(high32: u32) -> Self {
        SubSpec((high32 as u64) << 32)
    }

    /// Rewrite to `(subSpecHigh << 32) | indexWithinBucket`, guaranteeing
    /// uniqueness per-STF while preserving the original high 32 bits.
    pub fn rewrite(&self, index_within_bucket: u32) -> SubSpec {
        let high32 = (self.0 >> 32) as u32;
        SubSpec(((high32 as u64) << 32) | index_within_bucket as u64)
    }

    pub fn high32(&self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl From<u64> for SubSpec {
    fn from(v: u64) -> Self {
        SubSpec(v)
    }
}
