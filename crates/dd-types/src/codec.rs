//! Encoder/decoder for the interleaved multipart STF payload (§4.2).
//!
//! Per the Design Notes, this is a concrete encoder/decoder pair rather than
//! a visitor over STF contents: the STF has no polymorphic "accept" method,
//! [`encode`] simply walks its buckets and appends to an output list, moving
//! ownership of each buffer instead of copying it.

use crate::ids::{DataDescription, DataIdentifier, DataOrigin, SubSpec, TimeFrameId};
use crate::stf::{HbFrame, SubTimeFrame};
use thiserror::Error;

/// Magic tag for [`StfDistHeader`], distinguishing it from the on-disk
/// record magic used by the file sink (§4.5).
pub const STF_DIST_MAGIC: u64 = 0x5354_4644_4953_5431;

/// Fixed width reserved for an HBFrame's header buffer on the wire. Real RDH
/// buffers are fixed-size; shorter headers are zero-padded, longer ones are
/// rejected at encode time with [`CodecError::HeaderTooLarge`].
pub const RDH_LEN: usize = 64;

/// One part of a multipart message: an owned, contiguous byte buffer.
pub type Part = Vec<u8>;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    #[error("malformed multipart message: {0}")]
    MalformedMultipart(String),
    #[error("HBFrame header buffer of {0} bytes exceeds the {RDH_LEN}-byte wire slot")]
    HeaderTooLarge(usize),
}

#[derive(Copy, Clone, Debug)]
struct StfDistHeader {
    magic: u64,
    tfid: u64,
}

impl StfDistHeader {
    const WIRE_LEN: usize = 16;

    fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.tfid.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(CodecError::MalformedMultipart(format!(
                "expected {}-byte StfDistHeader, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        let magic = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let tfid = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        if magic != STF_DIST_MAGIC {
            return Err(CodecError::MalformedMultipart(format!(
                "bad StfDistHeader magic: {magic:#x}"
            )));
        }
        Ok(Self { magic, tfid })
    }
}

/// The STF-level header carried as the payload of the synthetic leading
/// `(DataHeader, payload)` pair (§4.2) and, unwrapped, as the second field of
/// an on-disk `StfFileRecord` (§4.5). Public so `dd-storage` can reuse the
/// same 12-byte wire representation for the file format.
#[derive(Copy, Clone, Debug)]
pub struct StfHeaderBody {
    pub id: u64,
    pub origin: u32,
}

impl StfHeaderBody {
    pub const WIRE_LEN: usize = 12;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.origin.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(CodecError::MalformedMultipart(format!(
                "expected {}-byte StfHeaderBody, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            id: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            origin: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

/// `DataHeader`: origin/description tag, the (possibly rewritten) subspec,
/// the HBFrame's fixed-width header slot, and the length of the payload
/// that follows as the next part. Public so `dd-storage` can reuse the same
/// per-fragment header for `HBFrameEntry` in the on-disk file format (§4.5).
#[derive(Clone, Debug)]
pub struct DataHeader {
    pub origin: u32,
    pub description: u32,
    pub subspec: u64,
    pub rdh: [u8; RDH_LEN],
    pub payload_len: u32,
}

impl DataHeader {
    pub const WIRE_LEN: usize = 4 + 4 + 8 + RDH_LEN + 4;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        buf.extend_from_slice(&self.origin.to_le_bytes());
        buf.extend_from_slice(&self.description.to_le_bytes());
        buf.extend_from_slice(&self.subspec.to_le_bytes());
        buf.extend_from_slice(&self.rdh);
        buf.extend_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(CodecError::MalformedMultipart(format!(
                "expected {}-byte DataHeader, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        let origin = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let description = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let subspec = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let mut rdh = [0u8; RDH_LEN];
        rdh.copy_from_slice(&bytes[16..16 + RDH_LEN]);
        let payload_len =
            u32::from_le_bytes(bytes[16 + RDH_LEN..20 + RDH_LEN].try_into().unwrap());
        Ok(Self {
            origin,
            description,
            subspec,
            rdh,
            payload_len,
        })
    }
}

/// Zero-pads `header_buf` into the fixed-width RDH slot used by both the
/// multipart wire format and the on-disk file format.
pub fn pad_header(header_buf: &[u8]) -> Result<[u8; RDH_LEN], CodecError> {
    if header_buf.len() > RDH_LEN {
        return Err(CodecError::HeaderTooLarge(header_buf.len()));
    }
    let mut rdh = [0u8; RDH_LEN];
    rdh[..header_buf.len()].copy_from_slice(header_buf);
    Ok(rdh)
}

/// Encodes `stf` into the interleaved multipart payload described in §4.2.
/// Ownership of every payload buffer moves into the returned `Vec`; nothing
/// is copied except the small fixed headers.
pub fn encode(stf: &SubTimeFrame) -> Result<Vec<Part>, CodecError> {
    let mut parts = Vec::new();

    parts.push(
        StfDistHeader {
            magic: STF_DIST_MAGIC,
            tfid: stf.id().0,
        }
        .to_bytes()
        .to_vec(),
    );

    let header_body = StfHeaderBody {
        id: stf.id().0,
        origin: stf.header.origin.as_tag(),
    }
    .to_bytes();
    parts.push(
        DataHeader {
            origin: DataOrigin::Flp.as_tag(),
            description: DataDescription::Subtimeframe.as_tag(),
            subspec: 0,
            rdh: [0u8; RDH_LEN],
            payload_len: header_body.len() as u32,
        }
        .to_bytes(),
    );
    parts.push(header_body.to_vec());

    for (data_id, bucket) in stf.buckets() {
        for (subspec, frames) in bucket {
            for (index, frame) in frames.iter().enumerate() {
                let rewritten = subspec.rewrite(index as u32);
                parts.push(
                    DataHeader {
                        origin: data_id.origin.as_tag(),
                        description: data_id.description.as_tag(),
                        subspec: rewritten.0,
                        rdh: pad_header(&frame.header_buf)?,
                        payload_len: frame.payload_buf.len() as u32,
                    }
                    .to_bytes(),
                );
                parts.push(frame.payload_buf.clone());
            }
        }
    }

    Ok(parts)
}

/// Reconstructs a [`SubTimeFrame`] from an incoming multipart message.
///
/// Requires that the leading part is a valid [`StfDistHeader`] and that
/// every subsequent `(DataHeader, payload)` pair shares its TFID, per §4.2.
pub fn decode(parts: &[Part]) -> Result<SubTimeFrame, CodecError> {
    if parts.is_empty() {
        return Err(CodecError::MalformedMultipart("empty multipart message".into()));
    }

    let dist_header = StfDistHeader::from_bytes(&parts[0])?;

    if parts.len() < 3 {
        return Err(CodecError::MalformedMultipart(
            "missing STF header (DataHeader, payload) pair".into(),
        ));
    }
    if (parts.len() - 1) % 2 != 0 {
        return Err(CodecError::MalformedMultipart(
            "unpaired DataHeader without a matching payload".into(),
        ));
    }

    let stf_header_dh = DataHeader::from_bytes(&parts[1])?;
    if stf_header_dh.origin != DataOrigin::Flp.as_tag()
        || stf_header_dh.description != DataDescription::Subtimeframe.as_tag()
        || stf_header_dh.subspec != 0
    {
        return Err(CodecError::MalformedMultipart(
            "first DataHeader is not the STF header entry".into(),
        ));
    }
    let header_body = StfHeaderBody::from_bytes(&parts[2])?;
    if header_body.id != dist_header.tfid {
        return Err(CodecError::MalformedMultipart(
            "StfHeaderBody TFID does not match StfDistHeader TFID".into(),
        ));
    }

    let mut stf = SubTimeFrame::new(
        TimeFrameId(header_body.id),
        DataOrigin::from_tag(header_body.origin),
    );

    let mut pairs = parts[3..].chunks_exact(2);
    for pair in &mut pairs {
        let dh = DataHeader::from_bytes(&pair[0])?;
        let payload = pair[1].clone();
        if payload.len() != dh.payload_len as usize {
            return Err(CodecError::MalformedMultipart(format!(
                "DataHeader payload_len {} does not match actual payload of {} bytes",
                dh.payload_len,
                payload.len()
            )));
        }

        let data_id = DataIdentifier::new(
            DataOrigin::from_tag(dh.origin),
            DataDescription::from_tag(dh.description),
        );
        let header_buf = strip_trailing_zeros(&dh.rdh);
        // The wire subspec is already `(high32 << 32) | indexWithinBucket`
        // (§4.2); keying the bucket by the rewritten value would split one
        // original bucket into N singletons and desync the index on
        // re-encode. Key by the preserved high 32 bits instead, in wire
        // order, so `SubSpec::rewrite` regenerates the same indices.
        stf.insert(
            data_id,
            SubSpec::new(SubSpec(dh.subspec).high32()),
            HbFrame::new(header_buf, payload),
        );
    }

    stf.finalize();
    Ok(stf)
}

/// Recovers the original (pre-padding) header buffer length by trimming
/// trailing zero bytes from a fixed-width RDH slot.
pub fn strip_trailing_zeros(rdh: &[u8; RDH_LEN]) -> Vec<u8> {
    let len = rdh.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    rdh[..len].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DataDescription;

    fn sample_stf() -> SubTimeFrame {
        let mut stf = SubTimeFrame::new(TimeFrameId(42), DataOrigin::Flp);
        let id = DataIdentifier::new(DataOrigin::Tpc, DataDescription::RawData);
        let subspec = SubSpec::new(0xAABBCCDD);
        stf.insert(id, subspec, HbFrame::new(b"rdh0".to_vec(), b"payload0".to_vec()));
        stf.insert(id, subspec, HbFrame::new(b"rdh1".to_vec(), b"payload1".to_vec()));
        stf.finalize();
        stf
    }

    #[test]
    fn subspec_rewrite_is_unique_per_stf() {
        let stf = sample_stf();
        let parts = encode(&stf).unwrap();
        let dh0 = DataHeader::from_bytes(&parts[3]).unwrap();
        let dh1 = DataHeader::from_bytes(&parts[5]).unwrap();
        assert_eq!(dh0.subspec, (0xAABBCCDDu64 << 32) | 0);
        assert_eq!(dh1.subspec, (0xAABBCCDDu64 << 32) | 1);
        assert_ne!(dh0.subspec, dh1.subspec);
    }

    #[test]
    fn round_trip_byte_identical_after_reencode() {
        let stf = sample_stf();
        let parts = encode(&stf).unwrap();
        let decoded = decode(&parts).unwrap();
        let reencoded = encode(&decoded).unwrap();
        assert_eq!(parts, reencoded);
    }

    #[test]
    fn decode_rejects_unpaired_trailing_header() {
        let stf = sample_stf();
        let mut parts = encode(&stf).unwrap();
        parts.pop();
        assert_eq!(
            decode(&parts).unwrap_err(),
            CodecError::MalformedMultipart(
                "unpaired DataHeader without a matching payload".into()
            )
        );
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut parts = encode(&sample_stf()).unwrap();
        parts[0][0] ^= 0xff;
        assert!(matches!(decode(&parts), Err(CodecError::MalformedMultipart(_))));
    }
}
