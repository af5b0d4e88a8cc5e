//! Data model, wire codec and RDH utilities shared by every role in the
//! Sub-Time-Frame distribution core.

pub mod codec;
pub mod ids;
pub mod rdh;
pub mod rpc;
pub mod stf;

pub use codec::{
    decode, encode, pad_header, strip_trailing_zeros, CodecError, DataHeader, Part, StfHeaderBody,
    RDH_LEN,
};
pub use ids::{DataDescription, DataIdentifier, DataOrigin, SubSpec, TimeFrameId};
pub use stf::{HbFrame, StfHeader, SubTimeFrame};
