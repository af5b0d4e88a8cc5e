//! Sidecar index (§4.5): `{recordOffset, recordLen, tfid, nHBF}` per record,
//! for rapid indexed lookup. Format is explicitly unstable — a private,
//! fixed-width binary layout private to a single sink/source pairing.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

const ENTRY_LEN: usize = 8 + 8 + 8 + 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SidecarEntry {
    pub record_offset: u64,
    pub record_len: u64,
    pub tfid: u64,
    pub n_hbf: u32,
}

impl SidecarEntry {
    fn to_bytes(self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0..8].copy_from_slice(&self.record_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.record_len.to_le_bytes());
        buf[16..24].copy_from_slice(&self.tfid.to_le_bytes());
        buf[24..28].copy_from_slice(&self.n_hbf.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8; ENTRY_LEN]) -> Self {
        Self {
            record_offset: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            record_len: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            tfid: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            n_hbf: u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
        }
    }
}

pub struct SidecarWriter {
    file: File,
}

impl SidecarWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            file: OpenOptions::new().create(true).append(true).open(path)?,
        })
    }

    pub fn append(&mut self, entry: SidecarEntry) -> io::Result<()> {
        self.file.write_all(&entry.to_bytes())
    }
}

pub fn load(path: impl AsRef<Path>) -> io::Result<Vec<SidecarEntry>> {
    let mut file = File::open(path)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    Ok(raw
        .chunks_exact(ENTRY_LEN)
        .map(|chunk| SidecarEntry::from_bytes(chunk.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stf.sidecar");

        let mut writer = SidecarWriter::create(&path).unwrap();
        writer
            .append(SidecarEntry {
                record_offset: 0,
                record_len: 64,
                tfid: 1,
                n_hbf: 3,
            })
            .unwrap();
        writer
            .append(SidecarEntry {
                record_offset: 64,
                record_len: 32,
                tfid: 2,
                n_hbf: 1,
            })
            .unwrap();
        drop(writer);

        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].record_offset, 64);
        assert_eq!(entries[1].tfid, 2);
    }
}
