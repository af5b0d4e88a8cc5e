//! On-disk `StfFileRecord` encoding (§4.5):
//!
//! ```text
//! file := ( StfFileRecord )*
//! StfFileRecord := [ RecordHeader ][ StfHeaderBody ][ HBFrameEntry* ]
//! RecordHeader := { magic, recordLen:u64, tfid:u64, nHBF:u32, flags:u32 }
//! HBFrameEntry := [ DataHeader ][ payloadLen:u32 ][ payloadBytes ]
//! ```
//!
//! Reuses `dd_types`'s `DataHeader`/`StfHeaderBody` wire structs so the
//! per-fragment layout matches the multipart codec exactly; only the framing
//! around them (the rolling file, the record header) is specific to storage.

use dd_types::ids::{DataDescription, DataIdentifier, DataOrigin, SubSpec, TimeFrameId};
use dd_types::stf::HbFrame;
use dd_types::{pad_header, strip_trailing_zeros, DataHeader, StfHeaderBody, SubTimeFrame};
use thiserror::Error;

/// Distinguishes the on-disk record magic from the wire `StfDistHeader`
/// magic used by the multipart codec (§4.2).
pub const RECORD_MAGIC: u64 = 0x5354_4646_5354_4631;

const RECORD_HEADER_LEN: usize = 8 + 8 + 8 + 4 + 4;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RecordError {
    #[error("truncated record: expected at least {0} bytes, got {1}")]
    Truncated(usize, usize),
    #[error("bad record magic: {0:#x}")]
    BadMagic(u64),
}

struct RecordHeader {
    magic: u64,
    record_len: u64,
    tfid: u64,
    n_hbf: u32,
    flags: u32,
}

impl RecordHeader {
    fn to_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.record_len.to_le_bytes());
        buf[16..24].copy_from_slice(&self.tfid.to_le_bytes());
        buf[24..28].copy_from_slice(&self.n_hbf.to_le_bytes());
        buf[28..32].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(RecordError::Truncated(RECORD_HEADER_LEN, bytes.len()));
        }
        let magic = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        if magic != RECORD_MAGIC {
            return Err(RecordError::BadMagic(magic));
        }
        Ok(Self {
            magic,
            record_len: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            tfid: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            n_hbf: u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[28..32].try_into().unwrap()),
        })
    }
}

/// Encodes `stf` as one `StfFileRecord`, including its own `RecordHeader`.
pub fn encode_record(stf: &SubTimeFrame) -> Vec<u8> {
    let header_body = StfHeaderBody {
        id: stf.id().0,
        origin: stf.header.origin.as_tag(),
    }
    .to_bytes();

    let mut entries = Vec::new();
    for (data_id, bucket) in stf.buckets() {
        for (subspec, frames) in bucket {
            for (index, frame) in frames.iter().enumerate() {
                let rewritten = subspec.rewrite(index as u32);
                let rdh = pad_header(&frame.header_buf)
                    .expect("HBFrame header buffer exceeds the RDH wire slot");
                entries.extend_from_slice(&DataHeader {
                    origin: data_id.origin.as_tag(),
                    description: data_id.description.as_tag(),
                    subspec: rewritten.0,
                    rdh,
                    payload_len: frame.payload_buf.len() as u32,
                }
                .to_bytes());
                entries.extend_from_slice(&frame.payload_buf);
            }
        }
    }

    let record_len = (RECORD_HEADER_LEN + header_body.len() + entries.len()) as u64;
    let mut out = Vec::with_capacity(record_len as usize);
    out.extend_from_slice(
        &RecordHeader {
            magic: RECORD_MAGIC,
            record_len,
            tfid: stf.id().0,
            n_hbf: stf.n_hbf() as u32,
            flags: 0,
        }
        .to_bytes(),
    );
    out.extend_from_slice(&header_body);
    out.extend_from_slice(&entries);
    out
}

/// Decodes one `StfFileRecord` from the start of `buf`, returning the STF
/// and the number of bytes the record occupied so the caller can advance
/// past it.
pub fn decode_record(buf: &[u8]) -> Result<(SubTimeFrame, usize), RecordError> {
    let header = RecordHeader::from_bytes(buf)?;
    let record_len = header.record_len as usize;
    if buf.len() < record_len {
        return Err(RecordError::Truncated(record_len, buf.len()));
    }

    let body_start = RECORD_HEADER_LEN;
    let body_end = body_start + StfHeaderBody::WIRE_LEN;
    let header_body = StfHeaderBody::from_bytes(&buf[body_start..body_end])
        .map_err(|_| RecordError::Truncated(body_end, buf.len()))?;

    let mut stf = SubTimeFrame::new(TimeFrameId(header_body.id), DataOrigin::from_tag(header_body.origin));

    let mut cursor = body_end;
    for _ in 0..header.n_hbf {
        let dh_end = cursor + DataHeader::WIRE_LEN;
        let dh = DataHeader::from_bytes(&buf[cursor..dh_end])
            .map_err(|_| RecordError::Truncated(dh_end, buf.len()))?;
        cursor = dh_end;
        let payload_end = cursor + dh.payload_len as usize;
        let payload = buf[cursor..payload_end].to_vec();
        cursor = payload_end;

        let data_id = DataIdentifier::new(DataOrigin::from_tag(dh.origin), DataDescription::from_tag(dh.description));
        stf.insert(data_id, SubSpec(dh.subspec), HbFrame::new(strip_trailing_zeros(&dh.rdh), payload));
    }

    stf.finalize();
    Ok((stf, record_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_types::ids::{DataDescription, DataOrigin, SubSpec};

    fn sample_stf() -> SubTimeFrame {
        let mut stf = SubTimeFrame::new(TimeFrameId(7), DataOrigin::Flp);
        let id = DataIdentifier::new(DataOrigin::Tpc, DataDescription::RawData);
        let subspec = SubSpec::new(0x1);
        stf.insert(id, subspec, HbFrame::new(b"rdh".to_vec(), b"payload".to_vec()));
        stf.finalize();
        stf
    }

    #[test]
    fn round_trips_a_single_record() {
        let stf = sample_stf();
        let bytes = encode_record(&stf);
        let (decoded, consumed) = decode_record(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.id(), stf.id());
        assert_eq!(decoded.n_hbf(), 1);
    }

    #[test]
    fn two_concatenated_records_decode_sequentially() {
        let a = encode_record(&{
            let mut s = SubTimeFrame::new(TimeFrameId(1), DataOrigin::Flp);
            s.finalize();
            s
        });
        let b = encode_record(&{
            let mut s = SubTimeFrame::new(TimeFrameId(2), DataOrigin::Flp);
            s.finalize();
            s
        });
        let mut buf = a.clone();
        buf.extend_from_slice(&b);

        let (first, consumed) = decode_record(&buf).unwrap();
        assert_eq!(first.id(), TimeFrameId(1));
        let (second, _) = decode_record(&buf[consumed..]).unwrap();
        assert_eq!(second.id(), TimeFrameId(2));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_record(&sample_stf());
        bytes[0] ^= 0xff;
        assert!(matches!(decode_record(&bytes), Err(RecordError::BadMagic(_))));
    }
}
